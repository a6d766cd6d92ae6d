// ABOUTME: Rollback engine restoring a snapshot onto the remote host.
// ABOUTME: Whole-project restores and single-service splices, both offline.

pub mod splice;
pub mod tags;

pub use splice::{SpliceError, has_service, splice_service};
pub use tags::{TagResolution, TagSource, resolve_archive_tag, tag_in};

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{ConflictError, Result};
use crate::remote::{Compose, Docker, RemoteLayout, StepRunner, fs};
use crate::snapshot::{ARCHIVE_SUFFIX, archive_stem, parse_tag_lines, sidecar_name_for_stem};
use crate::types::SnapshotId;

/// Prefix `docker load` prints for archives saved by image ID.
const LOADED_ID_PREFIX: &str = "Loaded image ID:";

/// What a restore put back in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot: SnapshotId,
    /// Tags loaded from the snapshot, in load order.
    pub images: Vec<String>,
    /// Set for a single-service restore.
    pub service: Option<String>,
}

/// Restores snapshots of one project environment.
pub struct RollbackEngine<'a> {
    runner: StepRunner<'a>,
    layout: &'a RemoteLayout,
    sudo: bool,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(runner: StepRunner<'a>, layout: &'a RemoteLayout, sudo: bool) -> Self {
        Self {
            runner,
            layout,
            sudo,
        }
    }

    fn compose(&self) -> Compose {
        Compose::new(self.layout.project_dir(), self.sudo)
    }

    fn docker(&self) -> Docker {
        Docker::new(self.sudo)
    }

    async fn ensure_complete(&self, id: &SnapshotId) -> Result<()> {
        if !self
            .runner
            .check(&fs::is_dir(&self.layout.snapshot_dir(id)))
            .await?
        {
            return Err(ConflictError::SnapshotNotFound(id.to_string()).into());
        }
        if !self
            .runner
            .check(&fs::is_file(&self.layout.snapshot_manifest(id)))
            .await?
        {
            return Err(ConflictError::SnapshotIncomplete {
                snapshot: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Restore the whole project from snapshot `id`.
    pub async fn restore(&self, id: &SnapshotId, diag: &mut Diagnostics) -> Result<RestoreReport> {
        self.ensure_complete(id).await?;
        let compose = self.compose();
        let docker = self.docker();

        tracing::info!("restoring snapshot {id}");
        self.runner
            .fatal(
                "create project directory",
                &fs::mkdir(&[&self.layout.project_dir()], self.sudo),
            )
            .await?;
        self.runner
            .fatal(
                "restore manifest",
                &fs::copy_file(&self.layout.snapshot_manifest(id), &self.layout.manifest_path()),
            )
            .await?;

        let snapshot_env = self.layout.snapshot_env_dir(id);
        if self.runner.check(&fs::is_dir(&snapshot_env)).await? {
            self.runner
                .best_effort(
                    "restore env files",
                    &fs::replace_dir(&snapshot_env, &self.layout.env_dir()),
                    diag,
                )
                .await;
        }

        let expected = self
            .runner
            .best_effort("list manifest images", &compose.config_images(None), diag)
            .await
            .map(|out| parse_tag_lines(&out.stdout))
            .unwrap_or_default();

        self.runner
            .best_effort("stop project", &compose.down(), diag)
            .await;
        for tag in &expected {
            self.runner
                .best_effort(
                    &format!("remove image {tag}"),
                    &docker.remove_image(tag),
                    diag,
                )
                .await;
        }

        let images = self.load_archives(id, &expected, None, diag).await?;

        self.runner
            .fatal("start project", &compose.up_all_offline())
            .await?;

        Ok(RestoreReport {
            snapshot: *id,
            images,
            service: None,
        })
    }

    /// Restore only `service` from snapshot `id`, leaving the rest of the manifest as deployed.
    pub async fn restore_service(
        &self,
        id: &SnapshotId,
        service: &str,
        diag: &mut Diagnostics,
    ) -> Result<RestoreReport> {
        self.ensure_complete(id).await?;
        let remote = self.runner.remote();

        let snapshot_text =
            String::from_utf8_lossy(&remote.read_file(&self.layout.snapshot_manifest(id)).await?)
                .into_owned();
        if !has_service(&snapshot_text, service) {
            return Err(ConflictError::ServiceNotInSnapshot {
                service: service.to_string(),
                snapshot: id.to_string(),
            }
            .into());
        }

        let current_text =
            String::from_utf8_lossy(&remote.read_file(&self.layout.manifest_path()).await?)
                .into_owned();
        let spliced = splice_service(&current_text, &snapshot_text, service).map_err(|e| {
            ConflictError::Splice {
                service: service.to_string(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!("restoring service {service} from snapshot {id}");
        remote
            .write_file(spliced.as_bytes(), &self.layout.manifest_path())
            .await?;

        // The env dir is shared: snapshot files are laid over the deployed ones.
        let snapshot_env = self.layout.snapshot_env_dir(id);
        if self.runner.check(&fs::is_dir(&snapshot_env)).await? {
            self.runner
                .best_effort(
                    "restore env files",
                    &format!(
                        "{} && {}",
                        fs::mkdir(&[&self.layout.env_dir()], self.sudo),
                        fs::copy_contents(&snapshot_env, &self.layout.env_dir())
                    ),
                    diag,
                )
                .await;
        }

        let compose = self.compose();
        self.runner
            .best_effort(
                &format!("stop {service}"),
                &compose.stop_remove(service),
                diag,
            )
            .await;

        let service_tags = self
            .runner
            .best_effort(
                &format!("list images of {service}"),
                &compose.config_images(Some(service)),
                diag,
            )
            .await
            .map(|out| parse_tag_lines(&out.stdout))
            .unwrap_or_default();

        let images = self
            .load_archives(id, &service_tags, Some(service_tags.as_slice()), diag)
            .await?;

        self.runner
            .fatal(
                &format!("start {service}"),
                &compose.up_service_offline(service),
            )
            .await?;

        Ok(RestoreReport {
            snapshot: *id,
            images,
            service: Some(service.to_string()),
        })
    }

    /// Load image archives of snapshot `id`.
    ///
    /// With `only`, archives whose resolved tag is not listed are skipped and
    /// the existing image is removed before loading.
    async fn load_archives(
        &self,
        id: &SnapshotId,
        expected: &[String],
        only: Option<&[String]>,
        diag: &mut Diagnostics,
    ) -> Result<Vec<String>> {
        let images_dir = self.layout.snapshot_images_dir(id);
        if !self.runner.check(&fs::is_dir(&images_dir)).await? {
            tracing::info!("snapshot {id} has no images");
            return Ok(Vec::new());
        }

        let listing = self
            .runner
            .fatal("list snapshot images", &fs::list(&images_dir))
            .await?;
        let mut stems: Vec<&str> = listing.stdout.lines().filter_map(archive_stem).collect();
        stems.sort_unstable();

        let docker = self.docker();
        let mut loaded = Vec::new();
        for stem in stems {
            let sidecar = self
                .runner
                .remote()
                .read_file(&format!("{images_dir}/{}", sidecar_name_for_stem(stem)))
                .await
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            let resolution = resolve_archive_tag(stem, sidecar.as_deref(), expected);
            if !resolution.ambiguous_with.is_empty() {
                diag.warn(Warning::tag_collision(format!(
                    "archive {stem} matches {} and {}; restoring as {}",
                    resolution.tag,
                    resolution.ambiguous_with.join(", "),
                    resolution.tag
                )));
            }
            let tag = resolution.tag;

            if let Some(only) = only {
                if !tag_in(&tag, only) {
                    tracing::debug!("skipping {tag}, not used by the service");
                    continue;
                }
                self.runner
                    .best_effort(
                        &format!("remove image {tag}"),
                        &docker.remove_image(&tag),
                        diag,
                    )
                    .await;
            }

            tracing::debug!("loading {stem} as {tag} ({:?})", resolution.source);
            let archive = format!("{images_dir}/{stem}{ARCHIVE_SUFFIX}");
            let output = self
                .runner
                .fatal(&format!("load image {tag}"), &docker.load(&archive))
                .await?;
            if let Some(image_id) = loaded_image_id(&output.stdout) {
                self.runner
                    .fatal(&format!("tag image {tag}"), &docker.tag(image_id, &tag))
                    .await?;
            }
            loaded.push(tag);
        }
        Ok(loaded)
    }
}

/// Image ID from `docker load` output for archives that carried no tag.
fn loaded_image_id(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix(LOADED_ID_PREFIX))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_load_output_yields_image_id() {
        assert_eq!(
            loaded_image_id("Loaded image ID: sha256:abc123\n"),
            Some("sha256:abc123")
        );
        assert_eq!(loaded_image_id("Loaded image: nginx:1.27\n"), None);
        assert_eq!(loaded_image_id(""), None);
    }
}
