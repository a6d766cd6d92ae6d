// ABOUTME: Compose transform pipeline producing the manifest uploaded to the host.
// ABOUTME: Merges environment sources into env files and applies mode-specific rewrites.

mod env_merge;

pub use env_merge::{env_file_applies, merge_service_environment, substitute};

use std::path::{Path, PathBuf};

use crate::config::Secrets;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ValidationError};
use crate::manifest::{ComposeFile, DeploymentMode, EnvFiles, ServiceMode};
use crate::vcs::RepositorySlug;

/// Local directory (under the manifest directory) receiving merged env files.
pub const LOCAL_ENV_DIR: &str = "env";

/// Inputs shared by every service of one transform run.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    pub environment: &'a str,
    pub workdir: &'a Path,
    pub secrets: &'a Secrets,
    pub project_mode: DeploymentMode,
    pub registry: &'a str,
    /// Needed only when a git-images service still has a build descriptor.
    pub repository: Option<&'a RepositorySlug>,
}

/// A merged env file written locally, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEnvFile {
    pub service: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub compose: ComposeFile,
    pub env_files: Vec<MergedEnvFile>,
}

/// Whether any service needs the repository identity for a git-images rewrite.
pub fn needs_repository(manifest: &ComposeFile, project_mode: DeploymentMode) -> Result<bool> {
    for (name, service) in manifest.services.iter() {
        if service.build.is_some()
            && service.effective_mode(name, project_mode)? == ServiceMode::GitImages
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Registry image a git-images service is published under.
pub fn registry_image(registry: &str, repository: &RepositorySlug, service: &str) -> String {
    format!(
        "{}/{}/{}-{}:latest",
        registry.trim_end_matches('/'),
        repository.owner,
        repository.name,
        service
    )
    .to_ascii_lowercase()
}

/// Resolve `manifest` for deployment.
///
/// Writes `env/<service>.env.<environment>` under the manifest directory for every
/// service with an environment source and points the service at `./env/<service>.env`.
pub fn transform(
    manifest: &ComposeFile,
    input: &TransformInput<'_>,
    diag: &mut Diagnostics,
) -> Result<ResolvedManifest> {
    let mut compose = manifest.clone();
    let mut env_files = Vec::new();
    let env_dir = input.workdir.join(LOCAL_ENV_DIR);

    for (name, service) in compose.services.iter_mut() {
        if service.has_environment_source() {
            let merged = merge_service_environment(
                name,
                service,
                input.environment,
                input.workdir,
                input.secrets,
                diag,
            );
            std::fs::create_dir_all(&env_dir)?;
            let local_path = env_dir.join(format!("{name}.env.{}", input.environment));
            std::fs::write(&local_path, merged)?;

            service.environment.clear();
            service.env_file = EnvFiles::new(vec![format!("./{LOCAL_ENV_DIR}/{name}.env")]);
            env_files.push(MergedEnvFile {
                service: name.to_string(),
                local_path,
            });
        }

        if service.build.is_some()
            && service.effective_mode(name, input.project_mode)? == ServiceMode::GitImages
        {
            let repository = input.repository.ok_or_else(|| {
                ValidationError::UnresolvableRepository("no origin remote".to_string())
            })?;
            let image = registry_image(input.registry, repository, name);
            tracing::debug!("{name}: build replaced by {image}");
            service.image = Some(image);
            service.build = None;
        }
    }

    Ok(ResolvedManifest { compose, env_files })
}
