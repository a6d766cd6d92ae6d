// ABOUTME: Project configuration stored in .scion/project.yml.
// ABOUTME: Resolves per-environment settings into an EnvironmentContext.

mod init;
mod secrets;
mod server;

pub use init::{ensure_gitignore, init_project};
pub use secrets::{FileSecretStore, SecretStore, Secrets, parse_secrets};
pub use server::ServerConfig;

use crate::error::{Error, Result};
use crate::manifest::DeploymentMode;
use crate::remote::RemoteLayout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".scion";
pub const CONFIG_FILENAME: &str = ".scion/project.yml";
pub const SECRETS_FILENAME: &str = ".scion/secrets.env";
pub const DEFAULT_REMOTE_BASE: &str = "/opt/scion";
pub const DEFAULT_REGISTRY: &str = "ghcr.io";
pub const DEFAULT_RETENTION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default)]
    pub deployment_mode: DeploymentMode,

    /// Registry used for images of git-images services.
    #[serde(default = "default_registry")]
    pub registry: String,

    #[serde(default = "default_remote_base")]
    pub remote_base: String,

    /// Number of snapshots kept per environment, unless overridden.
    #[serde(default = "default_retention")]
    pub rollback_backups: u32,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(deserialize_with = "server::deserialize_server")]
    pub server: ServerConfig,

    /// Run docker and directory setup through sudo.
    #[serde(default)]
    pub sudo: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_backups: Option<u32>,

    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub command_timeout: Option<Duration>,
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_remote_base() -> String {
    DEFAULT_REMOTE_BASE.to_string()
}

fn default_retention() -> u32 {
    DEFAULT_RETENTION
}

/// Everything needed to address one deployed environment of a project.
#[derive(Debug, Clone)]
pub struct EnvironmentContext {
    pub name: String,
    pub layout: RemoteLayout,
    pub server: ServerConfig,
    pub git_branch: Option<String>,
    pub hook_url: Option<String>,
    pub retention: u32,
    pub sudo: bool,
    pub command_timeout: Option<Duration>,
}

impl EnvironmentContext {
    pub fn ssh_session_config(&self) -> crate::ssh::SessionConfig {
        let config = self.server.ssh_session_config();
        match self.command_timeout {
            Some(timeout) => config.command_timeout(timeout),
            None => config,
        }
    }
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: None,
            deployment_mode: DeploymentMode::default(),
            registry: default_registry(),
            remote_base: default_remote_base(),
            rollback_backups: default_retention(),
            environments: BTreeMap::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the configuration of the project rooted at `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Err(Error::ConfigNotFound(dir.to_path_buf()));
        }
        Self::load(&path)
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILENAME)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir.join(CONFIG_DIR))?;
        std::fs::write(Self::path_in(dir), serde_yaml::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidConfig("project name cannot be empty".to_string()));
        }
        if name.contains('/') || name.contains(char::is_whitespace) {
            return Err(Error::InvalidConfig(format!(
                "project name must not contain '/' or whitespace: {name}"
            )));
        }
        if !self.remote_base.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "remote_base must be an absolute path: {}",
                self.remote_base
            )));
        }
        Ok(())
    }

    /// Resolve the settings of environment `name`.
    pub fn environment(&self, name: &str) -> Result<EnvironmentContext> {
        let env = self
            .environments
            .get(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))?;

        Ok(EnvironmentContext {
            name: name.to_string(),
            layout: RemoteLayout::new(&self.remote_base, &self.name, name),
            server: env.server.clone(),
            git_branch: env.git_branch.clone(),
            hook_url: env.hook_url.clone(),
            retention: env.rollback_backups.unwrap_or(self.rollback_backups),
            sudo: env.sudo,
            command_timeout: env.command_timeout,
        })
    }

    /// Change how many snapshots environment `name` keeps.
    pub fn set_retention(&mut self, name: &str, keep: u32) -> Result<()> {
        let env = self
            .environments
            .get_mut(name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))?;
        env.rollback_backups = Some(keep);
        Ok(())
    }

    pub fn secret_store(dir: &Path) -> FileSecretStore {
        FileSecretStore::new(dir.join(SECRETS_FILENAME))
    }
}
