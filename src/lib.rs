// ABOUTME: Library root for scion - the sync and rollback engine behind the CLI.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod manifest;
pub mod output;
pub mod remote;
pub mod rollback;
pub mod snapshot;
pub mod ssh;
pub mod sync;
pub mod transform;
pub mod types;
pub mod vcs;
