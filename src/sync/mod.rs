// ABOUTME: Sync orchestrator taking a project from the local manifest to running services.
// ABOUTME: Validates, transforms, snapshots, uploads, then builds or pulls each service.

mod options;
mod source;
mod strategy;
mod transfer;

pub use options::{GitSelection, SyncOptions};
pub use source::{BuildSource, resolve_commit};
pub use strategy::{DeployStrategy, SourceKind, classify};
pub use transfer::{
    DEFAULT_EXCLUDES, ExcludeSet, TransferMethod, default_excludes, generated_excludes,
    pack_directory, transfer_directory,
};

use std::path::Path;

use crate::config::{EnvironmentContext, ProjectConfig, Secrets, ensure_gitignore};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Result, ValidationError};
use crate::manifest::{ComposeFile, MANIFEST_FILENAME};
use crate::output::Output;
use crate::remote::{Compose, Docker, ExecPolicy, RemoteExecutor, StepRunner, fs};
use crate::snapshot::{SkipReason, SnapshotManager, SnapshotOutcome};
use crate::transform::{ResolvedManifest, TransformInput, needs_repository, transform};
use crate::types::CommitId;
use crate::vcs::{RepositorySlug, VersionControl};

/// Everything a sync run reads, passed explicitly.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext<'a> {
    pub project: &'a ProjectConfig,
    pub environment: &'a EnvironmentContext,
    /// Directory holding the manifest; build contexts are relative to it.
    pub workdir: &'a Path,
    pub secrets: &'a Secrets,
}

/// What a sync run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Strategy of every service acted on, in manifest order.
    pub strategies: Vec<(String, DeployStrategy)>,
    /// `None` when the snapshot attempt failed (recorded as a warning).
    pub snapshot: Option<SnapshotOutcome>,
    pub transfers: Vec<(String, TransferMethod)>,
    pub commit: Option<CommitId>,
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope<'s> {
    All,
    Service(&'s str),
}

pub struct Orchestrator<'a> {
    ctx: SyncContext<'a>,
    runner: StepRunner<'a>,
    vcs: &'a dyn VersionControl,
    output: &'a Output,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        ctx: SyncContext<'a>,
        remote: &'a dyn RemoteExecutor,
        vcs: &'a dyn VersionControl,
        output: &'a Output,
    ) -> Self {
        Self {
            ctx,
            runner: StepRunner::new(remote),
            vcs,
            output,
        }
    }

    fn compose(&self) -> Compose {
        Compose::new(self.ctx.environment.layout.project_dir(), self.ctx.environment.sudo)
    }

    fn snapshots(&self) -> SnapshotManager<'a> {
        SnapshotManager::new(
            self.runner,
            &self.ctx.environment.layout,
            self.ctx.environment.retention,
            self.ctx.environment.sudo,
        )
    }

    /// Sync every service, then bring the whole project up.
    pub async fn sync(&self, options: &SyncOptions, diag: &mut Diagnostics) -> Result<SyncReport> {
        self.run(Scope::All, options, diag).await
    }

    /// Sync one service; the manifest is still resolved and uploaded as a whole.
    pub async fn sync_service(
        &self,
        service: &str,
        options: &SyncOptions,
        diag: &mut Diagnostics,
    ) -> Result<SyncReport> {
        self.run(Scope::Service(service), options, diag).await
    }

    /// Upload the resolved manifest and env files without building anything.
    pub async fn sync_compose_only(&self, heave: bool, diag: &mut Diagnostics) -> Result<SyncReport> {
        let manifest = self.load_manifest()?;
        let resolved = self.resolve(&manifest, diag).await?;
        let yaml = resolved.compose.to_yaml()?;

        let snapshot = if self.ctx.project.deployment_mode.is_git() {
            tracing::info!("git-driven project, manifest-only sync takes no snapshot");
            Some(SnapshotOutcome::Skipped(SkipReason::GitMode))
        } else {
            self.backup(diag).await
        };

        self.prepare_remote().await?;
        self.upload_manifest(&resolved, &yaml).await?;

        if !heave {
            self.output.progress("  → Restarting project...");
            self.runner
                .fatal("start project", &self.compose().up_all())
                .await?;
        }

        Ok(SyncReport {
            strategies: Vec::new(),
            snapshot,
            transfers: Vec::new(),
            commit: None,
            started: !heave,
        })
    }

    /// Load the local manifest and keep generated files out of version control.
    fn load_manifest(&self) -> Result<ComposeFile> {
        let path = self.ctx.workdir.join(MANIFEST_FILENAME);
        if !path.is_file() {
            return Err(ValidationError::MissingManifest(path).into());
        }
        let manifest = ComposeFile::load(&path)?;
        ensure_gitignore(self.ctx.workdir)?;
        Ok(manifest)
    }

    /// Excludes for one build context; workdir contexts never carry secrets or merged env files.
    fn excludes_for(&self, source: &BuildSource) -> Vec<String> {
        let mut excludes = default_excludes(&source.local_dir);
        if source.kind == SourceKind::WorkdirDirect {
            for pattern in generated_excludes(&source.local_dir, self.ctx.workdir) {
                if !excludes.contains(&pattern) {
                    excludes.push(pattern);
                }
            }
        }
        excludes
    }

    async fn repository(&self, manifest: &ComposeFile) -> Result<Option<RepositorySlug>> {
        if !needs_repository(manifest, self.ctx.project.deployment_mode)? {
            return Ok(None);
        }
        let url = self
            .vcs
            .remote_url("origin")
            .await
            .map_err(|e| ValidationError::UnresolvableRepository(e.to_string()))?;
        RepositorySlug::from_remote_url(&url)
            .map(Some)
            .ok_or_else(|| ValidationError::UnresolvableRepository(url).into())
    }

    /// Transform the manifest and point server-built services at their uploaded contexts.
    async fn resolve(&self, manifest: &ComposeFile, diag: &mut Diagnostics) -> Result<ResolvedManifest> {
        let repository = self.repository(manifest).await?;
        let input = TransformInput {
            environment: &self.ctx.environment.name,
            workdir: self.ctx.workdir,
            secrets: self.ctx.secrets,
            project_mode: self.ctx.project.deployment_mode,
            registry: &self.ctx.project.registry,
            repository: repository.as_ref(),
        };
        let mut resolved = transform(manifest, &input, diag)?;

        for (name, service) in resolved.compose.services.iter_mut() {
            let builds_on_server = service
                .effective_mode(name, self.ctx.project.deployment_mode)?
                .builds_on_server();
            if let Some(build) = service.build.as_mut().filter(|_| builds_on_server) {
                build.context = format!("./{}", build.context_name(name));
            }
        }
        Ok(resolved)
    }

    async fn backup(&self, diag: &mut Diagnostics) -> Option<SnapshotOutcome> {
        self.output.progress("  → Taking snapshot...");
        match self.snapshots().backup(diag).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                diag.warn(Warning::backup(format!("snapshot failed: {e}")));
                None
            }
        }
    }

    async fn prepare_remote(&self) -> Result<()> {
        let layout = &self.ctx.environment.layout;
        self.runner
            .fatal(
                "create project directory",
                &fs::mkdir(
                    &[&layout.project_dir(), &layout.env_dir()],
                    self.ctx.environment.sudo,
                ),
            )
            .await?;
        Ok(())
    }

    async fn upload_manifest(&self, resolved: &ResolvedManifest, yaml: &str) -> Result<()> {
        let layout = &self.ctx.environment.layout;
        let remote = self.runner.remote();
        for env_file in &resolved.env_files {
            tracing::debug!("uploading env file of {}", env_file.service);
            remote
                .upload_file(&env_file.local_path, &layout.env_file(&env_file.service))
                .await?;
        }
        self.output.progress("  → Uploading manifest...");
        remote
            .write_file(yaml.as_bytes(), &layout.manifest_path())
            .await?;
        Ok(())
    }

    async fn run(
        &self,
        scope: Scope<'_>,
        options: &SyncOptions,
        diag: &mut Diagnostics,
    ) -> Result<SyncReport> {
        let manifest = self.load_manifest()?;
        let mode = self.ctx.project.deployment_mode;

        let selected: Vec<&str> = match scope {
            Scope::All => manifest.services.names().collect(),
            Scope::Service(name) => {
                if manifest.service(name).is_none() {
                    return Err(ValidationError::UnknownService(name.to_string()).into());
                }
                vec![name]
            }
        };

        let mut strategies = Vec::with_capacity(selected.len());
        for name in &selected {
            let service = manifest
                .service(name)
                .ok_or_else(|| ValidationError::UnknownService(name.to_string()))?;
            let strategy = classify(name, service, mode, options.git.is_some())?;
            tracing::debug!("{name}: {strategy}");
            strategies.push((name.to_string(), strategy));
        }

        let resolved = self.resolve(&manifest, diag).await?;

        let commit = match &options.git {
            Some(selection)
                if strategies
                    .iter()
                    .any(|(_, s)| *s == DeployStrategy::UploadBuild(SourceKind::GitExport)) =>
            {
                Some(
                    resolve_commit(
                        self.vcs,
                        selection,
                        self.ctx.environment.git_branch.as_deref(),
                    )
                    .await?,
                )
            }
            _ => None,
        };

        let mut sources = Vec::new();
        for (name, strategy) in &strategies {
            let DeployStrategy::UploadBuild(kind) = strategy else {
                continue;
            };
            let Some(build) = manifest.service(name).and_then(|s| s.build.as_ref()) else {
                continue;
            };
            let source = match (kind, &commit) {
                (SourceKind::GitExport, Some(commit)) => {
                    BuildSource::from_commit(name, build, self.vcs, commit).await?
                }
                _ => BuildSource::from_workdir(name, build, self.ctx.workdir)?,
            };
            sources.push(source);
        }
        let yaml = resolved.compose.to_yaml()?;

        // Local validation is done; the remote host is touched from here on.
        let snapshot = self.backup(diag).await;
        self.prepare_remote().await?;

        let layout = &self.ctx.environment.layout;
        let mut transfers = Vec::with_capacity(sources.len());
        for source in &sources {
            self.output
                .progress(&format!("  → Uploading {} sources...", source.service));
            let upload_path = format!(
                "{}/.scion-upload-{}.tar.gz",
                layout.project_dir(),
                source.context_name
            );
            let method = transfer_directory(
                self.runner,
                &source.local_dir,
                &layout.context_dir(&source.context_name),
                &upload_path,
                &self.excludes_for(source),
            )
            .await?;
            transfers.push((source.service.clone(), method));
        }

        self.upload_manifest(&resolved, &yaml).await?;

        let mut report = SyncReport {
            strategies,
            snapshot,
            transfers,
            commit,
            started: false,
        };
        if options.heave {
            tracing::info!("heave run, leaving services as they are");
            return Ok(report);
        }

        for (name, strategy) in &report.strategies {
            self.deploy_service(name, *strategy, options, diag).await?;
        }
        if scope == Scope::All {
            self.output.progress("  → Starting project...");
            self.runner
                .fatal("start project", &self.compose().up_all())
                .await?;
        }
        report.started = true;
        Ok(report)
    }

    async fn deploy_service(
        &self,
        name: &str,
        strategy: DeployStrategy,
        options: &SyncOptions,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let compose = self.compose();
        let docker = Docker::new(self.ctx.environment.sudo);

        let mut steps = vec![(
            format!("stop {name}"),
            compose.stop_remove(name),
            ExecPolicy::BestEffort,
        )];
        match strategy {
            DeployStrategy::Pull => {
                steps.push((format!("pull {name}"), compose.pull(name), ExecPolicy::Fatal));
            }
            DeployStrategy::UploadBuild(_) => {
                if options.no_cache {
                    steps.push((
                        "purge build cache".to_string(),
                        docker.prune_build_cache(),
                        ExecPolicy::BestEffort,
                    ));
                }
                steps.push((
                    format!("build {name}"),
                    compose.build(name, options.no_cache),
                    ExecPolicy::Fatal,
                ));
            }
        }
        steps.push((format!("start {name}"), compose.up_service(name), ExecPolicy::Fatal));
        steps.push((
            "prune dangling images".to_string(),
            docker.prune_images(),
            ExecPolicy::BestEffort,
        ));

        self.output
            .progress(&format!("  → Deploying {name} ({strategy})..."));
        for (step, command, policy) in &steps {
            self.runner.run(step, command, *policy, diag).await?;
        }
        Ok(())
    }
}
