// ABOUTME: SSH client module for remote server connections.
// ABOUTME: Command execution, file transfer over exec channels, and rsync directory sync.

mod client;
mod error;
mod rsync;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
pub use rsync::{RsyncInvocation, rsync_failure};
