// ABOUTME: Container image reference parsing and canonical tag form.
// ABOUTME: Lets "nginx" and "nginx:latest" be recognized as the same image.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// A parsed `[registry/]name[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_' | '@'))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (reference, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (path, tag) = match reference.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after.to_string())),
            _ => (reference, None),
        };

        if path.is_empty() || path.ends_with('/') {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        let (registry, name) = match path.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };

        let tag = if tag.is_none() && digest.is_none() {
            Some("latest".to_string())
        } else {
            tag
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Canonical spelling of an image tag, with an implicit `:latest` made explicit.
///
/// Strings that do not parse as image references are returned unchanged.
pub fn normalize_tag(tag: &str) -> String {
    match ImageRef::parse(tag) {
        Ok(image) => image.to_string(),
        Err(_) => tag.trim().to_string(),
    }
}
