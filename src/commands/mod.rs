// ABOUTME: Command handlers behind the scion CLI.
// ABOUTME: Loads the project once per invocation and hands it to sync or rollback.

mod connection;
mod rollback;
mod sync;

pub use rollback::{configure_retention, list_snapshots, rollback, rollback_service};
pub use sync::{sync, sync_compose};

use std::path::{Path, PathBuf};

use scion::config::{EnvironmentContext, ProjectConfig, SecretStore, Secrets};
use scion::error::Result;

/// A project directory with its configuration resolved for one environment.
pub struct Workspace {
    pub dir: PathBuf,
    pub project: ProjectConfig,
    pub environment: EnvironmentContext,
}

impl Workspace {
    pub fn load(dir: &Path, environment: &str) -> Result<Self> {
        let project = ProjectConfig::discover(dir)?;
        let environment = project.environment(environment)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            project,
            environment,
        })
    }

    pub fn secrets(&self) -> Result<Secrets> {
        ProjectConfig::secret_store(&self.dir).load()
    }
}
