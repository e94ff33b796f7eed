//! User-facing progress output and the run-scoped warning collector.
//!
//! Diagnostics for operators go through `tracing`; the `Log` trait carries
//! the human-readable progress lines whose routing depends on the selected
//! output format.
use std::sync::{Arc, Mutex};

/// Controls level of detail emitted by loggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Verbosity {
    /// No progress output.
    Off = 0,
    /// Minimal output: result rows and summaries.
    Low = 1,
    /// Per-command detail.
    Medium = 2,
    /// Debug-level detail.
    High = 3,
}

impl From<u8> for Verbosity {
    fn from(value: u8) -> Self {
        match value {
            0 => Verbosity::Off,
            1 => Verbosity::Low,
            2 => Verbosity::Medium,
            _ => Verbosity::High,
        }
    }
}

/// Abstraction for progress logger implementations.
pub trait Log {
    /// Log a message if `verbosity` is within the configured level.
    fn log(&self, verbosity: Verbosity, message: &str);
}

/// A no-op logger implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoOpLogger {}

impl Log for NoOpLogger {
    fn log(&self, _: Verbosity, _: &str) {}
}

/// A `tracing` based logger implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingLogger {
    /// Only messages with lower or equal verbosity will be logged.
    verbosity: Verbosity,
}

impl TracingLogger {
    #[must_use]
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl Log for TracingLogger {
    fn log(&self, verbosity: Verbosity, message: &str) {
        if verbosity > self.verbosity {
            return;
        }
        tracing::info!("{message}");
    }
}

impl<T> Log for &T
where
    T: Log,
{
    fn log(&self, verbosity: Verbosity, message: &str) {
        (*self).log(verbosity, message);
    }
}

/// Collector for warnings raised during a single run.
///
/// One collector is acquired per run and dropped at its end; concurrent runs
/// each own their own. Handles are cheap to clone and may be shared with
/// workers.
#[derive(Debug, Clone, Default)]
pub struct WarningSink {
    warnings: Arc<Mutex<Vec<String>>>,
}

impl WarningSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it on the diagnostic stream.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message);
        }
    }

    /// All warnings collected so far, in emission order.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|warnings| warnings.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings
            .lock()
            .map(|warnings| warnings.is_empty())
            .unwrap_or(true)
    }
}
