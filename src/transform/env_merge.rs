// ABOUTME: Merges literal environment entries and env files into one file per service.
// ABOUTME: Applies environment scoping of env files and ${KEY} secret substitution.

use std::path::Path;

use crate::config::Secrets;
use crate::diagnostics::{Diagnostics, Warning};
use crate::manifest::ComposeService;

/// Whether env file `path` is merged when deploying `environment`.
///
/// A file is scoped when its base name contains `.<env>.`, starts with `<env>.`,
/// or ends with `.<env>`. Files with at most one dot are generic and only
/// apply to `prod`.
pub fn env_file_applies(path: &str, environment: &str) -> bool {
    let base = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);

    let scoped = base.contains(&format!(".{environment}."))
        || base.starts_with(&format!("{environment}."))
        || base.ends_with(&format!(".{environment}"));
    if scoped {
        return true;
    }

    let generic = base.matches('.').count() <= 1;
    generic && environment == "prod"
}

/// Replace `${KEY}` with values from `secrets`; unknown keys stay as written.
pub fn substitute(text: &str, secrets: &Secrets) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match secrets.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Merged env file contents for one service.
///
/// Unreadable env files are reported and skipped.
pub fn merge_service_environment(
    service_name: &str,
    service: &ComposeService,
    environment: &str,
    workdir: &Path,
    secrets: &Secrets,
    diag: &mut Diagnostics,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !service.environment.is_empty() {
        sections.push(service.environment.entries().join("\n"));
    }

    for path in service.env_file.paths() {
        if !env_file_applies(path, environment) {
            tracing::debug!("{service_name}: skipping env file {path} for {environment}");
            continue;
        }
        match std::fs::read_to_string(workdir.join(path)) {
            Ok(content) => {
                let content = content.trim();
                if !content.is_empty() {
                    sections.push(content.to_string());
                }
            }
            Err(e) => diag.warn(Warning::env_file(format!(
                "{service_name}: cannot read env file {path}: {e}"
            ))),
        }
    }

    let mut merged = substitute(&sections.join("\n"), secrets);
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged
}
