// ABOUTME: Naming of image archives inside a snapshot.
// ABOUTME: Archive files use a sanitized tag; a sidecar file keeps the exact tag.

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
pub const SIDECAR_SUFFIX: &str = ".tag";

/// File-name-safe form of an image tag: `:` and `/` become `_`.
pub fn sanitize_tag(tag: &str) -> String {
    tag.replace([':', '/'], "_")
}

pub fn archive_name(tag: &str) -> String {
    format!("{}{ARCHIVE_SUFFIX}", sanitize_tag(tag))
}

pub fn sidecar_name(tag: &str) -> String {
    format!("{}{SIDECAR_SUFFIX}", sanitize_tag(tag))
}

/// Sidecar file name belonging to archive `stem`.
pub fn sidecar_name_for_stem(stem: &str) -> String {
    format!("{stem}{SIDECAR_SUFFIX}")
}

/// Stem of an archive file name, or None for anything else in the images directory.
pub fn archive_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(ARCHIVE_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

/// Image tags printed by `docker compose config --images`, one per line.
pub fn parse_tag_lines(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !tags.iter().any(|t| t == line) {
            tags.push(line.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_registry_and_tag_separators() {
        assert_eq!(sanitize_tag("ghcr.io/acme/shop-api:latest"), "ghcr.io_acme_shop-api_latest");
        assert_eq!(archive_name("myapp/backend:latest"), "myapp_backend_latest.tar.gz");
        assert_eq!(sidecar_name("myapp/backend:latest"), "myapp_backend_latest.tag");
    }

    #[test]
    fn stems_only_for_archives() {
        assert_eq!(archive_stem("nginx_1.27.tar.gz"), Some("nginx_1.27"));
        assert_eq!(archive_stem("nginx_1.27.tag"), None);
        assert_eq!(archive_stem(".tar.gz"), None);
        assert_eq!(sidecar_name_for_stem("nginx_1.27"), "nginx_1.27.tag");
    }

    #[test]
    fn tag_lines_are_deduplicated_in_order() {
        assert_eq!(
            parse_tag_lines("redis:7\n\nshop-api\nredis:7\n"),
            vec!["redis:7".to_string(), "shop-api".to_string()]
        );
    }
}
