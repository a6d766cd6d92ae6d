// ABOUTME: Secret store used for ${KEY} substitution in environment files.
// ABOUTME: The file-backed store reads KEY=VALUE lines from .scion/secrets.env.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub type Secrets = BTreeMap<String, String>;

/// Source of secret values.
pub trait SecretStore {
    fn load(&self) -> Result<Secrets>;
}

/// Secrets kept in a local dotenv-style file.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretStore for FileSecretStore {
    /// A missing file yields an empty store.
    fn load(&self) -> Result<Secrets> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_secrets(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Secrets::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse `KEY=VALUE` lines; blank lines and `#` comments are skipped.
pub fn parse_secrets(content: &str) -> Secrets {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
