//! Pluggable log sink.
//!
//! Engine log lines are routed through the process-wide default [`Logger`].
//! Internal diagnostics of this crate use `tracing` directly.

use parking_lot::RwLock;
use rowbind_engine::{EngineLogLevel, EngineLogSink};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Log severity. Ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Everything.
    All = 0,
    /// Very verbose tracing.
    Trace = 1,
    /// Debugging output.
    Debug = 2,
    /// Detailed operational output.
    Detail = 3,
    /// Informational.
    Info = 4,
    /// Warnings.
    Warn = 5,
    /// Errors.
    Error = 6,
    /// Unrecoverable errors.
    Fatal = 7,
    /// Nothing.
    Off = 8,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::All,
            1 => Self::Trace,
            2 => Self::Debug,
            3 => Self::Detail,
            4 => Self::Info,
            5 => Self::Warn,
            6 => Self::Error,
            7 => Self::Fatal,
            _ => Self::Off,
        }
    }
}

impl From<EngineLogLevel> for LogLevel {
    fn from(level: EngineLogLevel) -> Self {
        match level {
            EngineLogLevel::Trace => Self::Trace,
            EngineLogLevel::Debug => Self::Debug,
            EngineLogLevel::Detail => Self::Detail,
            EngineLogLevel::Info => Self::Info,
            EngineLogLevel::Warn => Self::Warn,
            EngineLogLevel::Error => Self::Error,
            EngineLogLevel::Fatal => Self::Fatal,
        }
    }
}

/// Receives log lines.
pub trait Logger: Send + Sync {
    /// Writes one line.
    fn do_log(&self, level: LogLevel, message: &str);
}

/// Forwards lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn do_log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::All | LogLevel::Trace => tracing::trace!(target: "rowbind", "{message}"),
            LogLevel::Debug | LogLevel::Detail => tracing::debug!(target: "rowbind", "{message}"),
            LogLevel::Info => tracing::info!(target: "rowbind", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "rowbind", "{message}"),
            LogLevel::Error | LogLevel::Fatal => tracing::error!(target: "rowbind", "{message}"),
            LogLevel::Off => {}
        }
    }
}

static DEFAULT_LOGGER: RwLock<Option<Arc<dyn Logger>>> = parking_lot::const_rwlock(None);
static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Replaces the default logger.
pub fn set_default_logger(logger: Arc<dyn Logger>) {
    *DEFAULT_LOGGER.write() = Some(logger);
}

/// Restores the [`TracingLogger`] default.
pub fn reset_default_logger() {
    *DEFAULT_LOGGER.write() = None;
}

/// Sets the minimum level that reaches the default logger.
pub fn set_default_level_threshold(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

/// Returns the minimum level that reaches the default logger.
pub fn default_level_threshold() -> LogLevel {
    LogLevel::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

/// Logs through the default logger.
///
/// A panicking logger is swallowed; logging never fails the caller.
pub fn log(level: LogLevel, message: &str) {
    if level == LogLevel::Off || level < default_level_threshold() {
        return;
    }
    let logger = DEFAULT_LOGGER.read().clone();
    let result = catch_unwind(AssertUnwindSafe(|| match logger {
        Some(logger) => logger.do_log(level, message),
        None => TracingLogger.do_log(level, message),
    }));
    if result.is_err() {
        tracing::warn!("log sink panicked; line dropped");
    }
}

/// Sink that routes engine lines into [`log`].
pub(crate) fn engine_log_sink() -> EngineLogSink {
    Arc::new(|level: EngineLogLevel, message: &str| log(level.into(), message))
}
