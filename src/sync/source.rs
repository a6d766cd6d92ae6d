// ABOUTME: Resolves the local directory each upload-build service is built from.
// ABOUTME: Either the working directory context or a commit exported from version control.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::options::GitSelection;
use super::strategy::SourceKind;
use crate::error::{Result, ValidationError};
use crate::manifest::BuildSpec;
use crate::types::CommitId;
use crate::vcs::VersionControl;

/// A build context ready for transfer.
#[derive(Debug)]
pub struct BuildSource {
    pub service: String,
    /// Directory name under the remote project directory.
    pub context_name: String,
    pub local_dir: PathBuf,
    pub kind: SourceKind,
    /// Keeps an exported tree alive until the transfer is done.
    _export: Option<TempDir>,
}

impl BuildSource {
    /// The context of `service` as found in `workdir`.
    pub fn from_workdir(service: &str, build: &BuildSpec, workdir: &Path) -> Result<Self> {
        let local_dir = workdir.join(&build.context);
        check_context(service, build, &local_dir)?;
        Ok(Self {
            service: service.to_string(),
            context_name: build.context_name(service),
            local_dir,
            kind: SourceKind::WorkdirDirect,
            _export: None,
        })
    }

    /// The context of `service` exported from `commit`.
    pub async fn from_commit(
        service: &str,
        build: &BuildSpec,
        vcs: &dyn VersionControl,
        commit: &CommitId,
    ) -> Result<Self> {
        let export = TempDir::new()?;
        tracing::debug!("exporting {} at {commit} for {service}", build.context);
        vcs.export_commit(commit, &build.context, export.path()).await?;
        check_context(service, build, export.path())?;
        Ok(Self {
            service: service.to_string(),
            context_name: build.context_name(service),
            local_dir: export.path().to_path_buf(),
            kind: SourceKind::GitExport,
            _export: Some(export),
        })
    }
}

fn check_context(service: &str, build: &BuildSpec, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(ValidationError::MissingBuildContext {
            service: service.to_string(),
            path: dir.to_path_buf(),
        }
        .into());
    }
    let build_file = dir.join(build.build_file());
    if !build_file.is_file() {
        return Err(ValidationError::MissingBuildFile {
            service: service.to_string(),
            path: build_file,
        }
        .into());
    }
    Ok(())
}

/// Commit to export: explicit commit, else the newest commit of the chosen branch.
///
/// The branch is the requested one, else the environment's bound branch, else
/// the current branch.
pub async fn resolve_commit(
    vcs: &dyn VersionControl,
    selection: &GitSelection,
    bound_branch: Option<&str>,
) -> Result<CommitId> {
    if let Some(commit) = &selection.commit {
        return Ok(CommitId::new(commit.clone()));
    }
    let branch = match selection.branch.as_deref().or(bound_branch) {
        Some(branch) => branch.to_string(),
        None => vcs.current_branch().await?,
    };
    let commit = vcs.latest_commit(&branch).await?;
    tracing::info!("using {commit} from branch {branch}");
    Ok(commit)
}
