// ABOUTME: Target server configuration for SSH connections.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use crate::ssh::SessionConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

impl ServerConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err("user name before '@' cannot be empty".to_string()),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {port}"))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(ServerConfig {
            host: host.to_string(),
            port,
            user,
            key_path: None,
            trust_first_connection: default_trust_first_connection(),
        })
    }

    /// Login user: configured, else `$USER`, else root.
    pub fn login_user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    /// SSH session settings for this server.
    pub fn ssh_session_config(&self) -> SessionConfig {
        let config = SessionConfig::new(&self.host, self.login_user())
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection);
        match &self.key_path {
            Some(path) => config.key_path(expand_home(path)),
            None => config,
        }
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var("HOME")) {
        (Ok(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Accepts either an address string or a detailed mapping.
pub(crate) fn deserialize_server<'de, D>(deserializer: D) -> Result<ServerConfig, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ServerEntry {
        Simple(String),
        Detailed(ServerConfig),
    }

    match ServerEntry::deserialize(deserializer)? {
        ServerEntry::Simple(s) => ServerConfig::parse(&s).map_err(serde::de::Error::custom),
        ServerEntry::Detailed(c) => Ok(c),
    }
}
