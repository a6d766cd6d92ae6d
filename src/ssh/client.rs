// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, authentication, command execution, and file streaming.

use super::error::{Error, Result};
use super::rsync::{RsyncInvocation, rsync_failure};
use crate::remote::shell_quote;
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Optional path to private key file.
    /// If None, will try SSH agent then default key locations.
    pub key_path: Option<PathBuf>,
    /// Whether to accept unknown hosts (Trust On First Use).
    pub trust_on_first_use: bool,
    /// Optional path to known_hosts file; defaults to ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Upper bound for a single remote command. Unbounded when None.
    pub command_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            command_timeout: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Raw bytes collected from one exec channel.
struct ChannelOutput {
    exit_code: u32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ChannelOutput {
    fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// SSH client handler for russh; verifies host keys against known_hosts.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        }
    }

    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!("Failed to save host key to known_hosts: {}", e);
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!("host key for {}:{} changed", self.host, self.port);
                Ok(false)
            }
            Ok(false) if self.trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                self.learn(server_public_key);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(_) => Ok(self.trust_on_first_use),
        }
    }
}

/// Authentication method resolved from config.
enum AuthMethod {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// Interval between keepalive requests while a session is open.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Unanswered keepalives before the peer is considered gone.
pub const KEEPALIVE_MAX: usize = 4;

/// Client settings for every session.
///
/// Commands such as `docker save` can stay silent for minutes; the session
/// must outlive them, so there is no inactivity timeout.
pub fn client_config() -> Config {
    Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    }
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Session {
    /// Connect to the remote host.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let auth_method = Self::resolve_auth_method(&config).await?;

        let mut handle = client::connect(
            Arc::new(client_config()),
            (config.host.as_str(), config.port),
            SshHandler::from_config(&config),
        )
        .await
        .map_err(|e| {
            Error::Connection(format!("{}@{}:{}: {}", config.user, config.host, config.port, e))
        })?;

        if !Self::authenticate(&mut handle, &config, auth_method).await? {
            return Err(Error::AuthenticationFailed);
        }

        tracing::debug!("connected to {}:{}", config.host, config.port);
        Ok(Self { config, handle })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Explicit key, then the SSH agent, then the usual key files under ~/.ssh.
    async fn resolve_auth_method(config: &SessionConfig) -> Result<AuthMethod> {
        if let Some(key_path) = &config.key_path {
            let key = load_secret_key(key_path, None).map_err(|e| Error::KeyLoadFailed {
                path: key_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(AuthMethod::KeyFile(Arc::new(key)));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(AuthMethod::Agent(agent));
        }

        let home = std::env::var("HOME").map_err(|_| {
            Error::AgentUnavailable("SSH agent not available and HOME not set".to_string())
        })?;

        ["id_ed25519", "id_rsa", "id_ecdsa"]
            .iter()
            .map(|name| Path::new(&home).join(".ssh").join(name))
            .find_map(|path| load_secret_key(&path, None).ok())
            .map(|key| AuthMethod::KeyFile(Arc::new(key)))
            .ok_or_else(|| {
                Error::AgentUnavailable("SSH agent not available and no default keys found".to_string())
            })
    }

    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                if keys.is_empty() {
                    return Err(Error::AgentUnavailable("no keys in SSH agent".to_string()));
                }

                for key in keys {
                    if let Ok(result) = handle
                        .authenticate_publickey_with(&config.user, key, None, &mut agent)
                        .await
                        && result.success()
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
        }
    }

    /// Execute a command on the remote host.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(command, "remote exec");
        let output = self.run_channel(command, None).await?;
        Ok(CommandOutput {
            exit_code: output.exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Stream `contents` into a remote file, replacing it.
    pub async fn write_file(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        let command = format!("cat > {}", shell_quote(remote_path));
        let output = self.run_channel(&command, Some(contents)).await?;
        if output.exit_code != 0 {
            return Err(Error::TransferFailed(format!(
                "writing {remote_path}: {}",
                output.stderr_text()
            )));
        }
        Ok(())
    }

    /// Read a remote file.
    pub async fn read_file(&self, remote_path: &str) -> Result<Vec<u8>> {
        let command = format!("cat {}", shell_quote(remote_path));
        let output = self.run_channel(&command, None).await?;
        if output.exit_code != 0 {
            return Err(Error::TransferFailed(format!(
                "reading {remote_path}: {}",
                output.stderr_text()
            )));
        }
        Ok(output.stdout)
    }

    /// Mirror a local directory into `remote_dir` with rsync.
    pub async fn sync_directory(
        &self,
        local: &Path,
        remote_dir: &str,
        excludes: &[String],
    ) -> Result<()> {
        let invocation = RsyncInvocation::new(&self.config, local, remote_dir, excludes);
        tracing::debug!(args = ?invocation.args, "rsync");

        let output = match tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SyncUnavailable("rsync is not installed locally".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(rsync_failure(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }

    async fn run_channel(&self, command: &str, stdin: Option<&[u8]>) -> Result<ChannelOutput> {
        match self.config.command_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run_channel_inner(command, stdin))
                .await
                .map_err(|_| Error::CommandTimeout(timeout))?,
            None => self.run_channel_inner(command, stdin).await,
        }
    }

    async fn run_channel_inner(&self, command: &str, stdin: Option<&[u8]>) -> Result<ChannelOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {}", e)))?;

        if let Some(data) = stdin {
            channel.data(data).await?;
            channel.eof().await?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        // Exit status and EOF may arrive in either order.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(ChannelOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
