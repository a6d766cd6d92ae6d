// ABOUTME: Structured view of the remote image catalog.
// ABOUTME: Parses `docker image ls --format '{{json .}}'` records into tag-to-ID lookups.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::types::{ImageId, normalize_tag};

#[derive(Debug, Deserialize)]
struct ImageRecord {
    #[serde(rename = "Repository")]
    repository: String,
    #[serde(rename = "Tag")]
    tag: String,
    #[serde(rename = "ID")]
    id: String,
}

/// Image IDs keyed by normalized tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCatalog {
    by_tag: BTreeMap<String, ImageId>,
}

impl ImageCatalog {
    pub fn id_for(&self, tag: &str) -> Option<&ImageId> {
        self.by_tag.get(&normalize_tag(tag))
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

/// Parse JSON-lines catalog output.
///
/// Dangling `<none>` entries and lines that are not image records are skipped.
pub fn parse_image_list(output: &str) -> ImageCatalog {
    let by_tag = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<ImageRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("skipping unparseable image record {line:?}: {e}");
                None
            }
        })
        .filter(|r| r.repository != "<none>" && r.tag != "<none>")
        .map(|r| {
            (
                normalize_tag(&format!("{}:{}", r.repository, r.tag)),
                ImageId::new(r.id),
            )
        })
        .collect();
    ImageCatalog { by_tag }
}
