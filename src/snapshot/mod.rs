// ABOUTME: Snapshot manager: pre-sync backups of manifest, env files, and images.
// ABOUTME: Also lists snapshots and rotates them down to the retention count.

pub mod archive;

pub use archive::{
    ARCHIVE_SUFFIX, archive_name, archive_stem, parse_tag_lines, sanitize_tag, sidecar_name,
    sidecar_name_for_stem,
};

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{ConflictError, Result};
use crate::remote::{Compose, Docker, RemoteLayout, StepRunner, fs, parse_image_list};
use crate::types::SnapshotId;

/// Why no snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Retention is zero.
    RetentionDisabled,
    /// No manifest is deployed yet.
    NothingDeployed,
    /// Git-driven projects are not snapshotted on manifest-only syncs.
    GitMode,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SkipReason::RetentionDisabled => "retention is 0",
            SkipReason::NothingDeployed => "nothing deployed yet",
            SkipReason::GitMode => "git-driven project",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created(SnapshotId),
    Skipped(SkipReason),
}

/// Identifiers to delete so that only the newest `retention` remain.
pub fn snapshots_to_prune(ids: &[SnapshotId], retention: u32) -> Vec<SnapshotId> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted.into_iter().skip(retention as usize).collect()
}

/// Creates, lists, and rotates snapshots of one project environment.
pub struct SnapshotManager<'a> {
    runner: StepRunner<'a>,
    layout: &'a RemoteLayout,
    retention: u32,
    sudo: bool,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(runner: StepRunner<'a>, layout: &'a RemoteLayout, retention: u32, sudo: bool) -> Self {
        Self {
            runner,
            layout,
            retention,
            sudo,
        }
    }

    /// Snapshot the deployed state, then rotate.
    ///
    /// Only directory creation and the manifest copy are mandatory; env and
    /// image capture failures are recorded as warnings.
    pub async fn backup(&self, diag: &mut Diagnostics) -> Result<SnapshotOutcome> {
        if self.retention == 0 {
            return Ok(SnapshotOutcome::Skipped(SkipReason::RetentionDisabled));
        }
        if !self.runner.check(&fs::is_file(&self.layout.manifest_path())).await? {
            tracing::info!("no deployed manifest, skipping snapshot");
            return Ok(SnapshotOutcome::Skipped(SkipReason::NothingDeployed));
        }

        let id = self.next_id().await?;
        let compose_dir = self.layout.snapshot_compose_dir(&id);
        let images_dir = self.layout.snapshot_images_dir(&id);

        self.runner
            .fatal(
                "create snapshot directory",
                &fs::mkdir(&[&compose_dir, &images_dir], self.sudo),
            )
            .await?;
        self.runner
            .fatal(
                "copy manifest into snapshot",
                &fs::copy_file(&self.layout.manifest_path(), &self.layout.snapshot_manifest(&id)),
            )
            .await?;

        let env_dir = self.layout.env_dir();
        if self.runner.check(&fs::is_dir(&env_dir)).await? {
            self.runner
                .best_effort(
                    "copy env files into snapshot",
                    &fs::replace_dir(&env_dir, &self.layout.snapshot_env_dir(&id)),
                    diag,
                )
                .await;
        }

        let saved = self.save_images(&images_dir, diag).await;
        tracing::info!("snapshot {id} created with {saved} image(s)");

        self.rotate(diag).await?;
        Ok(SnapshotOutcome::Created(id))
    }

    /// Smallest identifier at or after now whose directory does not exist yet.
    async fn next_id(&self) -> Result<SnapshotId> {
        let mut id = SnapshotId::now();
        while self
            .runner
            .check(&fs::exists(&self.layout.snapshot_dir(&id)))
            .await?
        {
            id = id.next();
        }
        Ok(id)
    }

    async fn save_images(&self, images_dir: &str, diag: &mut Diagnostics) -> usize {
        let compose = Compose::new(self.layout.project_dir(), self.sudo);
        let docker = Docker::new(self.sudo);

        let Some(tags) = self
            .runner
            .best_effort("list manifest images", &compose.config_images(None), diag)
            .await
        else {
            return 0;
        };
        let tags = parse_tag_lines(&tags.stdout);

        let Some(listing) = self
            .runner
            .best_effort("query image catalog", &docker.list_images(), diag)
            .await
        else {
            return 0;
        };
        let catalog = parse_image_list(&listing.stdout);

        let mut saved = 0;
        for tag in &tags {
            let Some(id) = catalog.id_for(tag) else {
                tracing::debug!("image {tag} not present on host, not saved");
                continue;
            };
            tracing::debug!("saving {tag} ({id})");

            let archive = format!("{images_dir}/{}", archive_name(tag));
            if self
                .runner
                .best_effort(
                    &format!("save image {tag}"),
                    &docker.save_compressed(tag, &archive),
                    diag,
                )
                .await
                .is_none()
            {
                continue;
            }

            let sidecar = format!("{images_dir}/{}", sidecar_name(tag));
            match self
                .runner
                .remote()
                .write_file(format!("{tag}\n").as_bytes(), &sidecar)
                .await
            {
                Ok(()) => saved += 1,
                Err(e) => diag.warn(Warning::backup(format!("writing tag file for {tag}: {e}"))),
            }
        }
        saved
    }

    /// Delete snapshots beyond the retention count; returns the deleted identifiers.
    pub async fn rotate(&self, diag: &mut Diagnostics) -> Result<Vec<SnapshotId>> {
        let ids = self.list().await?;
        let prune = snapshots_to_prune(&ids, self.retention);
        for id in &prune {
            self.runner
                .best_effort(
                    &format!("remove old snapshot {id}"),
                    &fs::remove_dir(&self.layout.snapshot_dir(id), self.sudo),
                    diag,
                )
                .await;
        }
        Ok(prune)
    }

    /// Snapshot identifiers, newest first.
    pub async fn list(&self) -> Result<Vec<SnapshotId>> {
        let root = self.layout.backup_root();
        if !self.runner.check(&fs::is_dir(&root)).await? {
            return Ok(Vec::new());
        }
        let listing = self.runner.fatal("list snapshots", &fs::list(&root)).await?;
        let mut ids: Vec<SnapshotId> = listing
            .stdout
            .lines()
            .filter_map(|line| SnapshotId::parse(line).ok())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// The requested snapshot, or the newest one.
    pub async fn resolve(&self, requested: Option<&str>) -> Result<SnapshotId> {
        match requested {
            Some(text) => {
                let id = SnapshotId::parse(text)
                    .map_err(|_| ConflictError::SnapshotNotFound(text.to_string()))?;
                if !self
                    .runner
                    .check(&fs::is_dir(&self.layout.snapshot_dir(&id)))
                    .await?
                {
                    return Err(ConflictError::SnapshotNotFound(text.to_string()).into());
                }
                Ok(id)
            }
            None => self
                .list()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ConflictError::NoSnapshots.into()),
        }
    }
}
