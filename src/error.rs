// ABOUTME: Application-wide error types for scion.
// ABOUTME: Splits failures into validation, transport, remote command, and conflict classes.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("project configuration not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected before any remote mutation happened.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] crate::ssh::Error),

    /// A mandatory remote step exited non-zero.
    #[error("{step} failed (exit code {exit_code}): {stderr}")]
    RemoteCommand {
        step: String,
        exit_code: u32,
        stderr: String,
    },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("version control error: {0}")]
    Vcs(#[from] crate::vcs::VcsError),

    #[error("manifest error: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Problems with local inputs, detected before the remote host is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("manifest not found: {0}")]
    MissingManifest(PathBuf),

    #[error("service not found in manifest: {0}")]
    UnknownService(String),

    #[error("build context for service {service} not found: {path}")]
    MissingBuildContext { service: String, path: PathBuf },

    #[error("build file for service {service} not found: {path}")]
    MissingBuildFile { service: String, path: PathBuf },

    #[error("service {0} declares neither an image nor a build descriptor")]
    NoImageOrBuild(String),

    #[error("service {service} has a build descriptor but mode {mode} does not build on the server")]
    UnsupportedBuildMode { service: String, mode: String },

    #[error("unknown deployment mode label on service {service}: {value}")]
    UnknownMode { service: String, value: String },

    #[error("cannot derive repository owner/name from remote URL: {0}")]
    UnresolvableRepository(String),
}

/// The requested state does not exist on the remote host.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("no snapshots available")]
    NoSnapshots,

    #[error("snapshot {snapshot} has no manifest")]
    SnapshotIncomplete { snapshot: String },

    #[error("service {service} not present in snapshot {snapshot}")]
    ServiceNotInSnapshot { service: String, snapshot: String },

    #[error("cannot splice service {service} into manifest: {reason}")]
    Splice { service: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
