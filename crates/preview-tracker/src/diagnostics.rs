//! Sink for structured warnings the tracker reports.
//!
//! Library code logs through the `log` facade; warnings that callers may
//! need to observe (dropped records, a second runtime owner) also go through
//! a [`Diagnostics`] implementation so they can be counted.

use std::sync::Mutex;

pub trait Diagnostics: Send + Sync {
    fn warn(&self, message: &str);
}

/// Forwards every diagnostic to `log::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }
}

/// Keeps every warning in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    warnings: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn warn(&self, message: &str) {
        log::warn!("{}", message);
        self.warnings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(message.to_string());
    }
}
