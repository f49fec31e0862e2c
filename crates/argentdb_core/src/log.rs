//! Diagnostic log manager.
//!
//! The engine reports registrations, backups and restores through a
//! [`LogManager`]. Every message goes to `tracing` and to each registered
//! [`LogSink`]. The manager is write-only: nothing in the engine ever reads
//! a log back.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Fine-grained progress.
    Verbose,
    /// Normal operational messages.
    Information,
    /// Something unexpected that did not fail the operation.
    Warning,
    /// An operation failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Verbose => "verbose",
            Self::Information => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// A destination for engine log messages.
pub trait LogSink: Send + Sync {
    /// Receives one message.
    fn write(&self, level: LogLevel, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn write(&self, level: LogLevel, message: &str) {
        self(level, message);
    }
}

#[derive(Default)]
struct LogState {
    min_level: Option<LogLevel>,
    sinks: Vec<Arc<dyn LogSink>>,
}

/// Fans log messages out to `tracing` and registered sinks.
///
/// Cloning shares the sink list.
#[derive(Clone, Default)]
pub struct LogManager {
    state: Arc<RwLock<LogState>>,
}

impl LogManager {
    /// Creates a manager with no sinks that forwards everything to `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink. Sinks receive messages in registration order.
    pub fn register_sink(&self, sink: Arc<dyn LogSink>) {
        self.state.write().sinks.push(sink);
    }

    /// Drops messages below `level` before they reach sinks.
    ///
    /// `tracing` filtering is configured separately by the subscriber.
    pub fn set_min_level(&self, level: LogLevel) {
        self.state.write().min_level = Some(level);
    }

    /// Logs one message.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Verbose => tracing::debug!(target: "argentdb", "{message}"),
            LogLevel::Information => tracing::info!(target: "argentdb", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "argentdb", "{message}"),
            LogLevel::Error => tracing::error!(target: "argentdb", "{message}"),
        }

        let sinks = {
            let state = self.state.read();
            if state.min_level.is_some_and(|min| level < min) {
                return;
            }
            state.sinks.clone()
        };
        for sink in sinks {
            sink.write(level, message);
        }
    }

    /// Shorthand for [`LogLevel::Verbose`].
    pub fn verbose(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Verbose, message);
    }

    /// Shorthand for [`LogLevel::Information`].
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Information, message);
    }

    /// Shorthand for [`LogLevel::Warning`].
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    /// Shorthand for [`LogLevel::Error`].
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for LogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("LogManager")
            .field("min_level", &state.min_level)
            .field("sinks", &state.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn capture(manager: &LogManager) -> Arc<Mutex<Vec<(LogLevel, String)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        manager.register_sink(Arc::new(move |level: LogLevel, msg: &str| {
            sink_seen.lock().push((level, msg.to_string()));
        }));
        seen
    }

    #[test]
    fn messages_reach_sinks() {
        let manager = LogManager::new();
        let seen = capture(&manager);

        manager.info("registered");
        manager.error("failed");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (LogLevel::Information, "registered".to_string()));
        assert_eq!(seen[1].0, LogLevel::Error);
    }

    #[test]
    fn min_level_filters_sinks() {
        let manager = LogManager::new();
        let seen = capture(&manager);
        manager.set_min_level(LogLevel::Warning);

        manager.verbose("noise");
        manager.info("noise");
        manager.warn("kept");

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn clones_share_sinks() {
        let manager = LogManager::new();
        let seen = capture(&manager);
        manager.clone().info("via clone");
        assert_eq!(seen.lock().len(), 1);
    }
}
