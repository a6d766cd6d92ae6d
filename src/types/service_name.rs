// ABOUTME: Compose service name validation.
// ABOUTME: Accepts the character set docker compose allows for service keys.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("service name cannot be empty")]
    Empty,

    #[error("service name must start with a letter or digit")]
    BadStart,

    #[error("invalid character in service name: '{0}'")]
    InvalidChar(char),
}

/// Name of a service in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        let first = value.chars().next().ok_or(ServiceNameError::Empty)?;
        if !first.is_ascii_alphanumeric() {
            return Err(ServiceNameError::BadStart);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
        {
            return Err(ServiceNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ServiceName {
    type Err = ServiceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
