// ABOUTME: VersionControl implementation driving the git command line.
// ABOUTME: Commit export streams `git archive` output through the tar crate.

use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{Result, VcsError, VersionControl};
use crate::types::CommitId;

/// Git repository rooted at (or containing) `dir`.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VcsError::Unavailable(e.to_string()),
                _ => VcsError::Io(e),
            })?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn git_text(&self, args: &[&str]) -> Result<String> {
        let stdout = self.git(args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

/// Tree-ish selecting `path` relative to the working directory at `commit`.
fn subtree_spec(commit: &CommitId, path: &str) -> String {
    let path = path.trim().trim_start_matches("./").trim_end_matches('/');
    if path.is_empty() || path == "." {
        format!("{commit}:./")
    } else {
        format!("{commit}:./{path}")
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn current_branch(&self) -> Result<String> {
        self.git_text(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn latest_commit(&self, branch: &str) -> Result<CommitId> {
        let local = format!("{branch}^{{commit}}");
        match self.git_text(&["rev-parse", "--verify", &local]).await {
            Ok(hash) => Ok(CommitId::new(hash)),
            Err(local_err) => {
                let remote = format!("origin/{branch}^{{commit}}");
                self.git_text(&["rev-parse", "--verify", &remote])
                    .await
                    .map(CommitId::new)
                    .map_err(|_| local_err)
            }
        }
    }

    async fn export_commit(&self, commit: &CommitId, path_filter: &str, dest: &Path) -> Result<()> {
        let spec = subtree_spec(commit, path_filter);
        let archive = self.git(&["archive", "--format=tar", &spec]).await?;
        std::fs::create_dir_all(dest)?;
        tar::Archive::new(Cursor::new(archive)).unpack(dest)?;
        tracing::debug!("exported {spec} into {}", dest.display());
        Ok(())
    }

    async fn remote_url(&self, name: &str) -> Result<String> {
        self.git_text(&["remote", "get-url", name]).await
    }
}
