// ABOUTME: Works out which image tag an archive in a snapshot should be restored under.
// ABOUTME: Sidecar tag first, then a sanitized match against expected tags, then the file stem.

use crate::snapshot::sanitize_tag;
use crate::types::normalize_tag;

/// Where a restored tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSource {
    Sidecar,
    SanitizedMatch,
    FileName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResolution {
    pub tag: String,
    pub source: TagSource,
    /// Other expected tags that sanitize to the same stem.
    pub ambiguous_with: Vec<String>,
}

/// Resolve the tag for archive `stem`.
///
/// When several expected tags sanitize to `stem`, the first in manifest
/// order wins and the rest are reported in `ambiguous_with`.
pub fn resolve_archive_tag(stem: &str, sidecar: Option<&str>, expected: &[String]) -> TagResolution {
    if let Some(tag) = sidecar.map(str::trim).filter(|t| !t.is_empty()) {
        return TagResolution {
            tag: tag.to_string(),
            source: TagSource::Sidecar,
            ambiguous_with: Vec::new(),
        };
    }

    let mut matches = expected.iter().filter(|tag| sanitize_tag(tag) == stem);
    match matches.next() {
        Some(first) => TagResolution {
            tag: first.clone(),
            source: TagSource::SanitizedMatch,
            ambiguous_with: matches.cloned().collect(),
        },
        None => TagResolution {
            tag: stem.to_string(),
            source: TagSource::FileName,
            ambiguous_with: Vec::new(),
        },
    }
}

/// Whether `tag` is one of `tags`, ignoring an implicit `:latest`.
pub fn tag_in(tag: &str, tags: &[String]) -> bool {
    let wanted = normalize_tag(tag);
    tags.iter().any(|t| normalize_tag(t) == wanted)
}
