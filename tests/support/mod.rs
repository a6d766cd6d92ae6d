// ABOUTME: Test support utilities.
// ABOUTME: Provides the fake remote host, fake version control, and project fixtures.

use scion::config::{ProjectConfig, Secrets};
use std::path::Path;
use std::sync::Once;

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod fake_remote;
#[allow(dead_code)]
pub mod fake_vcs;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("scion=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Project config with a `prod` and a `staging` environment.
#[allow(dead_code)]
pub fn project(mode: &str, retention: u32) -> ProjectConfig {
    project_config(mode, retention, false)
}

/// Same project on hosts where the remote base needs sudo.
#[allow(dead_code)]
pub fn sudo_project(mode: &str, retention: u32) -> ProjectConfig {
    project_config(mode, retention, true)
}

#[allow(dead_code)]
fn project_config(mode: &str, retention: u32, sudo: bool) -> ProjectConfig {
    ProjectConfig::from_yaml(&format!(
        r#"
name: shop
deployment_mode: {mode}
rollback_backups: {retention}
environments:
  prod:
    server: deploy@prod.example.com
    sudo: {sudo}
  staging:
    server: deploy@staging.example.com
    git_branch: develop
    sudo: {sudo}
"#
    ))
    .unwrap()
}

#[allow(dead_code)]
pub fn secrets(pairs: &[(&str, &str)]) -> Secrets {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Write `files` (relative path, contents) under `dir`.
#[allow(dead_code)]
pub fn write_tree(dir: &Path, files: &[(&str, &str)]) {
    for (path, contents) in files {
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(target, contents).unwrap();
    }
}
