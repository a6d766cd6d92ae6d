// ABOUTME: In-memory VersionControl for sync tests.
// ABOUTME: Branch heads and commit trees are fixed up front; exports are recorded.

use async_trait::async_trait;
use scion::types::CommitId;
use scion::vcs::{Result, VcsError, VersionControl};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeVcs {
    pub current: String,
    pub heads: BTreeMap<String, String>,
    /// Files of each commit, keyed by path relative to the repository root.
    pub trees: BTreeMap<String, BTreeMap<String, String>>,
    pub origin: Option<String>,
    pub exports: Mutex<Vec<(String, String)>>,
}

impl FakeVcs {
    pub fn with_origin(url: &str) -> Self {
        Self {
            current: "main".to_string(),
            origin: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn commit(mut self, branch: &str, hash: &str, files: &[(&str, &str)]) -> Self {
        self.heads.insert(branch.to_string(), hash.to_string());
        self.trees.insert(
            hash.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        );
        self
    }

    pub fn exports(&self) -> Vec<(String, String)> {
        self.exports.lock().unwrap().clone()
    }
}

fn failed(command: &str, stderr: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn current_branch(&self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn latest_commit(&self, branch: &str) -> Result<CommitId> {
        self.heads
            .get(branch)
            .map(|hash| CommitId::new(hash.clone()))
            .ok_or_else(|| failed("rev-parse", "unknown revision"))
    }

    async fn export_commit(&self, commit: &CommitId, path_filter: &str, dest: &Path) -> Result<()> {
        let tree = self
            .trees
            .get(commit.as_str())
            .ok_or_else(|| failed("archive", "not a tree object"))?;
        let filter = path_filter.trim_start_matches("./").trim_end_matches('/');
        let prefix = if filter.is_empty() || filter == "." {
            String::new()
        } else {
            format!("{filter}/")
        };
        for (path, contents) in tree {
            if let Some(relative) = path.strip_prefix(&prefix) {
                let target = dest.join(relative);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, contents)?;
            }
        }
        self.exports
            .lock()
            .unwrap()
            .push((commit.to_string(), path_filter.to_string()));
        Ok(())
    }

    async fn remote_url(&self, name: &str) -> Result<String> {
        self.origin
            .clone()
            .ok_or_else(|| failed("remote get-url", &format!("No such remote '{name}'")))
    }
}
