// ABOUTME: User-facing output of sync and rollback commands.
// ABOUTME: Normal, quiet, and JSON-lines rendering of progress, results, and warnings.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress steps and results.
    Normal,
    /// Results, listings, and warnings only.
    Quiet,
    /// One JSON object per line.
    Json,
}

/// Renders command feedback in one mode.
#[derive(Debug)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.duration().unwrap_or(0.0)
    }

    /// Print a step of a running command (normal mode only).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// Print the final result of a command, with timing when a timer runs.
    pub fn success(&self, message: &str) {
        match (self.mode, self.duration()) {
            (OutputMode::Normal, Some(secs)) => println!("{message} ({secs:.1}s)"),
            (OutputMode::Normal | OutputMode::Quiet, _) => println!("{message}"),
            (OutputMode::Json, secs) => self.emit_json("success", message, secs, false),
        }
    }

    /// Print a warning collected during the run.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit_json("warning", message, None, true),
        }
    }

    /// Print one entry of a listing (shown in every mode).
    pub fn item(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit_json("item", message, None, false),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_json("error", message, self.duration(), true),
        }
    }

    fn emit_json(&self, event: &str, message: &str, duration_secs: Option<f64>, to_stderr: bool) {
        let event = JsonEvent {
            event,
            message,
            duration_secs,
        };
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        if to_stderr {
            eprintln!("{json}");
        } else {
            println!("{json}");
        }
    }
}

impl OutputMode {
    /// Resolve the mode from the global CLI flags; JSON wins over quiet.
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
