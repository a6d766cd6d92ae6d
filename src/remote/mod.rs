// ABOUTME: Remote host abstraction used by sync, snapshot, and rollback.
// ABOUTME: Command builders, path layout, execution policy, and the image catalog.

mod commands;
mod images;
mod layout;
mod policy;
mod shell;

pub use commands::{Compose, Docker, fs};
pub use images::{ImageCatalog, parse_image_list};
pub use layout::RemoteLayout;
pub use policy::{ExecPolicy, StepRunner};
pub use shell::shell_quote;

use async_trait::async_trait;
use std::path::Path;

use crate::ssh::{self, CommandOutput, Session};

/// Everything the engine needs from the remote host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command.
    async fn run(&self, command: &str) -> ssh::Result<CommandOutput>;

    /// Replace a remote file with `contents`.
    async fn write_file(&self, contents: &[u8], remote_path: &str) -> ssh::Result<()>;

    /// Read a remote file.
    async fn read_file(&self, remote_path: &str) -> ssh::Result<Vec<u8>>;

    /// Incrementally mirror a local directory into `remote_dir`.
    ///
    /// Returns `ssh::Error::SyncUnavailable` when no incremental transport exists.
    async fn sync_directory(
        &self,
        local: &Path,
        remote_dir: &str,
        excludes: &[String],
    ) -> ssh::Result<()>;

    async fn upload_file(&self, local: &Path, remote_path: &str) -> ssh::Result<()> {
        let contents = tokio::fs::read(local).await?;
        self.write_file(&contents, remote_path).await
    }

    async fn download_file(&self, remote_path: &str, local: &Path) -> ssh::Result<()> {
        let contents = self.read_file(remote_path).await?;
        tokio::fs::write(local, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for Session {
    async fn run(&self, command: &str) -> ssh::Result<CommandOutput> {
        self.exec(command).await
    }

    async fn write_file(&self, contents: &[u8], remote_path: &str) -> ssh::Result<()> {
        Session::write_file(self, contents, remote_path).await
    }

    async fn read_file(&self, remote_path: &str) -> ssh::Result<Vec<u8>> {
        Session::read_file(self, remote_path).await
    }

    async fn sync_directory(
        &self,
        local: &Path,
        remote_dir: &str,
        excludes: &[String],
    ) -> ssh::Result<()> {
        Session::sync_directory(self, local, remote_dir, excludes).await
    }
}
