//! Routing of engine log lines.

use crate::engine::{EngineLogLevel, EngineLogSink};
use parking_lot::RwLock;

/// Holds the installed log sink. Without a sink, lines go to `tracing`.
#[derive(Default)]
pub(crate) struct LogHub {
    sink: RwLock<Option<EngineLogSink>>,
}

impl LogHub {
    pub(crate) fn set(&self, sink: Option<EngineLogSink>) {
        *self.sink.write() = sink;
    }

    /// Emits a line. The message is only built if someone will see it.
    pub(crate) fn emit(&self, level: EngineLogLevel, message: impl FnOnce() -> String) {
        let sink = self.sink.read().clone();
        match sink {
            Some(sink) => sink(level, &message()),
            None => match level {
                EngineLogLevel::Trace => tracing::trace!(target: "rowbind_engine", "{}", message()),
                EngineLogLevel::Debug | EngineLogLevel::Detail => {
                    tracing::debug!(target: "rowbind_engine", "{}", message());
                }
                EngineLogLevel::Info => tracing::info!(target: "rowbind_engine", "{}", message()),
                EngineLogLevel::Warn => tracing::warn!(target: "rowbind_engine", "{}", message()),
                EngineLogLevel::Error | EngineLogLevel::Fatal => {
                    tracing::error!(target: "rowbind_engine", "{}", message());
                }
            },
        }
    }
}
