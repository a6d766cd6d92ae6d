// ABOUTME: Diagnostics accumulator for non-fatal warnings during sync and rollback.
// ABOUTME: Collects warnings that shouldn't fail a run but should be shown to users.

/// Collects non-fatal warnings during sync and rollback operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings of a single kind.
    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A best-effort remote step (stop, prune, housekeeping) failed.
    pub fn best_effort_step(message: impl Into<String>) -> Self {
        Self::new(WarningKind::BestEffortStep, message)
    }

    /// The pre-sync snapshot could not be taken.
    pub fn backup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Backup, message)
    }

    /// An environment file could not be read.
    pub fn env_file(message: impl Into<String>) -> Self {
        Self::new(WarningKind::EnvFile, message)
    }

    /// Several image tags map onto the same archive name.
    pub fn tag_collision(message: impl Into<String>) -> Self {
        Self::new(WarningKind::TagCollision, message)
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    BestEffortStep,
    Backup,
    EnvFile,
    TagCollision,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
}
