// ABOUTME: Incremental directory sync through the system rsync binary.
// ABOUTME: Reuses the session's host, port, and key so both transports share an identity.

use super::client::SessionConfig;
use super::error::Error;
use std::path::Path;

/// Program and arguments for one rsync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsyncInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl RsyncInvocation {
    pub fn new(config: &SessionConfig, local: &Path, remote_dir: &str, excludes: &[String]) -> Self {
        let mut ssh = format!("ssh -p {} -o BatchMode=yes", config.port);
        if config.trust_on_first_use {
            ssh.push_str(" -o StrictHostKeyChecking=accept-new");
        } else {
            ssh.push_str(" -o StrictHostKeyChecking=yes");
        }
        if let Some(known_hosts) = &config.known_hosts_path {
            ssh.push_str(&format!(" -o UserKnownHostsFile='{}'", known_hosts.display()));
        }
        if let Some(key) = &config.key_path {
            ssh.push_str(&format!(" -i '{}'", key.display()));
        }

        let mut args = vec![
            "-az".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            ssh,
        ];
        args.extend(excludes.iter().map(|pattern| format!("--exclude={pattern}")));
        // Trailing slashes copy the directory contents rather than the directory itself.
        args.push(format!("{}/", local.display().to_string().trim_end_matches('/')));
        args.push(format!(
            "{}@{}:{}/",
            config.user,
            config.host,
            remote_dir.trim_end_matches('/')
        ));

        Self {
            program: "rsync".to_string(),
            args,
        }
    }
}

/// Classify a failed rsync run.
///
/// A missing rsync on either side is reported as `SyncUnavailable`.
pub fn rsync_failure(exit_code: Option<i32>, stderr: &str) -> Error {
    let missing = exit_code == Some(127)
        || stderr.contains("command not found")
        || stderr.contains("rsync: not found");
    if missing {
        Error::SyncUnavailable(stderr.trim().to_string())
    } else {
        Error::TransferFailed(format!(
            "rsync exited with {}: {}",
            exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        ))
    }
}
