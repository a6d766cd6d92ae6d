// ABOUTME: Version-control collaborator used for commit export and repository identity.
// ABOUTME: The git CLI implementation lives in git.rs.

mod git;

pub use git::GitCli;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::types::CommitId;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("git is not available: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VcsError>;

#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn current_branch(&self) -> Result<String>;

    async fn latest_commit(&self, branch: &str) -> Result<CommitId>;

    /// Write the tree of `path_filter` at `commit` into `dest`, with `path_filter` as its root.
    async fn export_commit(&self, commit: &CommitId, path_filter: &str, dest: &Path) -> Result<()>;

    async fn remote_url(&self, name: &str) -> Result<String>;
}

/// Owner and name of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

impl RepositorySlug {
    /// Parse `https://host/owner/name(.git)` or `git@host:owner/name(.git)`, lowercased.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let url = url.trim();
        let path = if let Some(rest) = url.split_once("://").map(|(_, rest)| rest) {
            rest.split_once('/')?.1
        } else {
            url.split_once(':')?.1
        };

        let mut parts = path.trim_matches('/').rsplit('/');
        let name = parts.next()?;
        let owner = parts.next()?;
        let name = name.strip_suffix(".git").unwrap_or(name);

        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        })
    }
}
