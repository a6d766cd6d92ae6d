// ABOUTME: Remote directory layout for a project environment.
// ABOUTME: Deployment and snapshot paths are pure functions of base, project, and environment.

use crate::manifest::REMOTE_MANIFEST_FILENAME;
use crate::types::SnapshotId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    base: String,
    slug: String,
}

impl RemoteLayout {
    pub fn new(base: &str, project: &str, environment: &str) -> Self {
        let suffix = format!("-{environment}");
        // Avoid "shop-prod-prod" when the project name already carries the environment.
        let slug = if project.ends_with(&suffix) {
            project.to_string()
        } else {
            format!("{project}{suffix}")
        };
        Self {
            base: base.trim_end_matches('/').to_string(),
            slug,
        }
    }

    /// `<base>/projects/<project>-<env>`
    pub fn project_dir(&self) -> String {
        format!("{}/projects/{}", self.base, self.slug)
    }

    pub fn manifest_path(&self) -> String {
        format!("{}/{}", self.project_dir(), REMOTE_MANIFEST_FILENAME)
    }

    pub fn env_dir(&self) -> String {
        format!("{}/env", self.project_dir())
    }

    /// Remote env file for `service`, environment-neutral.
    pub fn env_file(&self, service: &str) -> String {
        format!("{}/{}.env", self.env_dir(), service)
    }

    /// Where an uploaded build context lives.
    pub fn context_dir(&self, context_name: &str) -> String {
        format!("{}/{}", self.project_dir(), context_name)
    }

    /// `<base>/backup/<project>-<env>`
    pub fn backup_root(&self) -> String {
        format!("{}/backup/{}", self.base, self.slug)
    }

    pub fn snapshot_dir(&self, id: &SnapshotId) -> String {
        format!("{}/{}", self.backup_root(), id)
    }

    pub fn snapshot_compose_dir(&self, id: &SnapshotId) -> String {
        format!("{}/compose", self.snapshot_dir(id))
    }

    pub fn snapshot_manifest(&self, id: &SnapshotId) -> String {
        format!("{}/{}", self.snapshot_compose_dir(id), REMOTE_MANIFEST_FILENAME)
    }

    pub fn snapshot_env_dir(&self, id: &SnapshotId) -> String {
        format!("{}/env", self.snapshot_compose_dir(id))
    }

    pub fn snapshot_images_dir(&self, id: &SnapshotId) -> String {
        format!("{}/images", self.snapshot_dir(id))
    }
}
