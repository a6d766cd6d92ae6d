// ABOUTME: Deployment modes at project level and per-service label values.
// ABOUTME: Resolves a service's effective mode from its label or the project default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label key carrying a service's deployment mode.
pub const MODE_LABEL: &str = "scion.mode";

/// How a project is deployed as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    GitImages,
    GitRepoServerbuild,
    GitManual,
    #[default]
    DirectServerbuild,
    DirectLocalbuild,
    Cloud,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::GitImages => "git-images",
            DeploymentMode::GitRepoServerbuild => "git-repo-serverbuild",
            DeploymentMode::GitManual => "git-manual",
            DeploymentMode::DirectServerbuild => "direct-serverbuild",
            DeploymentMode::DirectLocalbuild => "direct-localbuild",
            DeploymentMode::Cloud => "cloud",
        }
    }

    /// Git-driven modes, whose deploys are normally triggered by CI.
    pub fn is_git(&self) -> bool {
        matches!(
            self,
            DeploymentMode::GitImages | DeploymentMode::GitRepoServerbuild | DeploymentMode::GitManual
        )
    }

    /// Label value a service gets when it carries no mode label.
    pub fn service_mode(&self) -> ServiceMode {
        match self {
            DeploymentMode::GitImages => ServiceMode::GitImages,
            DeploymentMode::GitRepoServerbuild => ServiceMode::GitRepoServerbuild,
            DeploymentMode::GitManual => ServiceMode::GitManual,
            DeploymentMode::DirectServerbuild => ServiceMode::Serverbuild,
            DeploymentMode::DirectLocalbuild => ServiceMode::Localbuild,
            DeploymentMode::Cloud => ServiceMode::Cloud,
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode of a single service, as written in its `scion.mode` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceMode {
    GitImages,
    GitRepoServerbuild,
    GitManual,
    Serverbuild,
    Localbuild,
    Cloud,
}

impl ServiceMode {
    pub const ALL: [ServiceMode; 6] = [
        ServiceMode::GitImages,
        ServiceMode::GitRepoServerbuild,
        ServiceMode::GitManual,
        ServiceMode::Serverbuild,
        ServiceMode::Localbuild,
        ServiceMode::Cloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMode::GitImages => "git-images",
            ServiceMode::GitRepoServerbuild => "git-repo-serverbuild",
            ServiceMode::GitManual => "git-manual",
            ServiceMode::Serverbuild => "serverbuild",
            ServiceMode::Localbuild => "localbuild",
            ServiceMode::Cloud => "cloud",
        }
    }

    /// Whether the image is built on the remote host from uploaded sources.
    pub fn builds_on_server(&self) -> bool {
        matches!(
            self,
            ServiceMode::Serverbuild | ServiceMode::GitRepoServerbuild | ServiceMode::GitManual
        )
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}
