// ABOUTME: Snapshot identifiers in YYYYMMDDHHMMSS form.
// ABOUTME: Lexical order of identifiers equals creation order.

use chrono::{NaiveDateTime, TimeDelta, Utc};
use std::fmt;
use thiserror::Error;

const FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid snapshot identifier: {0}")]
pub struct ParseSnapshotIdError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(NaiveDateTime);

impl SnapshotId {
    pub fn now() -> Self {
        Self::from_datetime(Utc::now().naive_utc())
    }

    /// Truncates sub-second precision so the identifier round-trips through its text form.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        let text = at.format(FORMAT).to_string();
        Self(NaiveDateTime::parse_from_str(&text, FORMAT).unwrap_or(at))
    }

    pub fn parse(input: &str) -> Result<Self, ParseSnapshotIdError> {
        let input = input.trim();
        if input.len() != 14 || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseSnapshotIdError(input.to_string()));
        }
        NaiveDateTime::parse_from_str(input, FORMAT)
            .map(Self)
            .map_err(|_| ParseSnapshotIdError(input.to_string()))
    }

    /// The identifier one second later, used when a directory already exists.
    pub fn next(self) -> Self {
        Self(self.0 + TimeDelta::seconds(1))
    }

    /// Human form used by listings: `DD/MM/YYYY | HH:MM:SS`.
    pub fn display_time(&self) -> String {
        self.0.format("%d/%m/%Y | %H:%M:%S").to_string()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl std::str::FromStr for SnapshotId {
    type Err = ParseSnapshotIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
