//! Diagnostics sink
//!
//! GPU components never reach for a global logger. Each one receives a
//! [`Diagnostics`] handle at construction and reports human-readable strings
//! through it. The default sink forwards to the `log` facade.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::Level;

/// Receiver of leveled, human-readable diagnostic messages
pub trait DiagnosticsSink: Send + Sync {
    /// Record a single message
    fn report(&self, level: Level, message: &str);
}

/// Sink forwarding every message to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, level: Level, message: &str) {
        log::log!(target: "render_core", level, "{}", message);
    }
}

/// Sink that keeps every message in memory
///
/// Useful for headless tools and for asserting on emitted warnings.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded messages
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Messages recorded at exactly `level`
    pub fn at_level(&self, level: Level) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_owned()));
        }
    }
}

/// Cheaply cloneable handle to a diagnostics sink
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticsSink>,
}

impl Diagnostics {
    /// Wrap an existing sink
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }

    /// Diagnostics forwarding to the `log` facade
    pub fn log() -> Self {
        Self::new(Arc::new(LogSink))
    }

    /// Report a message at an explicit level
    pub fn report(&self, level: Level, message: impl AsRef<str>) {
        self.sink.report(level, message.as_ref());
    }

    /// Report an error
    pub fn error(&self, message: impl AsRef<str>) {
        self.report(Level::Error, message);
    }

    /// Report a warning
    pub fn warn(&self, message: impl AsRef<str>) {
        self.report(Level::Warn, message);
    }

    /// Report an informational message
    pub fn info(&self, message: impl AsRef<str>) {
        self.report(Level::Info, message);
    }

    /// Report a debug message
    pub fn debug(&self, message: impl AsRef<str>) {
        self.report(Level::Debug, message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::log()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}
