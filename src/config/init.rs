// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates .scion/project.yml and keeps secrets out of version control.

use std::path::Path;

use crate::error::{Error, Result};
use crate::transform::LOCAL_ENV_DIR;

use super::{CONFIG_DIR, DEFAULT_REMOTE_BASE, DEFAULT_RETENTION, ProjectConfig};

/// Write a starter project configuration into `dir`.
pub fn init_project(dir: &Path, name: Option<&str>, force: bool) -> Result<()> {
    let config_path = ProjectConfig::path_in(dir);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let name = match name {
        Some(n) => n.to_string(),
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidConfig("cannot derive a project name".to_string()))?,
    };

    // Validate before writing anything.
    ProjectConfig::from_yaml(&template(&name))?;

    std::fs::create_dir_all(dir.join(CONFIG_DIR))?;
    std::fs::write(&config_path, template(&name))?;

    let ignore = dir.join(CONFIG_DIR).join(".gitignore");
    if !ignore.exists() {
        std::fs::write(ignore, "secrets.env\n")?;
    }

    Ok(())
}

/// Make sure `dir/.gitignore` lists the config dir and the merged env dir.
///
/// Returns whether the file was changed.
pub fn ensure_gitignore(dir: &Path) -> Result<bool> {
    let path = dir.join(".gitignore");
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let mut updated = existing.clone();
    for entry in [format!("{CONFIG_DIR}/"), format!("{LOCAL_ENV_DIR}/")] {
        if existing.lines().any(|line| line.trim() == entry) {
            continue;
        }
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&entry);
        updated.push('\n');
    }

    if updated == existing {
        return Ok(false);
    }
    std::fs::write(&path, updated)?;
    tracing::info!("added generated entries to {}", path.display());
    Ok(true)
}

fn template(name: &str) -> String {
    format!(
        r#"name: {name}
# domain: {name}.example.com
# One of: git-images, git-repo-serverbuild, git-manual,
# direct-serverbuild, direct-localbuild, cloud
deployment_mode: direct-serverbuild
remote_base: {DEFAULT_REMOTE_BASE}
rollback_backups: {DEFAULT_RETENTION}
environments:
  prod:
    server: deploy@server.example.com
    # git_branch: main
    # sudo: true
    # command_timeout: 10m
"#
    )
}
