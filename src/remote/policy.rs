// ABOUTME: Executes remote steps under an explicit fatal or best-effort policy.
// ABOUTME: Best-effort failures become diagnostics; fatal ones become typed errors.

use super::RemoteExecutor;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::ssh::CommandOutput;

/// How a failing remote step affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPolicy {
    /// Abort the run.
    Fatal,
    /// Record a warning and carry on.
    BestEffort,
}

/// Runs named steps against a remote executor.
#[derive(Clone, Copy)]
pub struct StepRunner<'a> {
    remote: &'a dyn RemoteExecutor,
}

impl<'a> StepRunner<'a> {
    pub fn new(remote: &'a dyn RemoteExecutor) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &'a dyn RemoteExecutor {
        self.remote
    }

    /// Run `command` as `step`.
    ///
    /// Returns `Ok(None)` when a best-effort step failed.
    pub async fn run(
        &self,
        step: &str,
        command: &str,
        policy: ExecPolicy,
        diag: &mut Diagnostics,
    ) -> Result<Option<CommandOutput>> {
        match policy {
            ExecPolicy::Fatal => self.fatal(step, command).await.map(Some),
            ExecPolicy::BestEffort => Ok(self.best_effort(step, command, diag).await),
        }
    }

    pub async fn fatal(&self, step: &str, command: &str) -> Result<CommandOutput> {
        tracing::debug!(step, command, "fatal step");
        let output = self.remote.run(command).await?;
        if !output.success() {
            return Err(Error::RemoteCommand {
                step: step.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    pub async fn best_effort(
        &self,
        step: &str,
        command: &str,
        diag: &mut Diagnostics,
    ) -> Option<CommandOutput> {
        tracing::debug!(step, command, "best-effort step");
        match self.remote.run(command).await {
            Ok(output) if output.success() => Some(output),
            Ok(output) => {
                diag.warn(Warning::best_effort_step(format!(
                    "{step} failed (exit code {}): {}",
                    output.exit_code,
                    output.stderr.trim()
                )));
                None
            }
            Err(e) => {
                diag.warn(Warning::best_effort_step(format!("{step} failed: {e}")));
                None
            }
        }
    }

    /// Run a test-style command, mapping its exit status to a boolean.
    pub async fn check(&self, command: &str) -> Result<bool> {
        Ok(self.remote.run(command).await?.success())
    }
}
