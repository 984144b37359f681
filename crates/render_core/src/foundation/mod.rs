//! Foundation utilities shared by every layer of the crate

/// Diagnostics sink injected into GPU components
pub mod diagnostics;
/// Logging initialization for binaries and tests
pub mod logging;

pub use diagnostics::{Diagnostics, DiagnosticsSink, LogSink, MemorySink};
