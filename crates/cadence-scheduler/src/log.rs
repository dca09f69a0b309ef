//! Log sink registration for scheduler diagnostics.
//!
//! Every diagnostic is emitted as a `tracing` event. A [`LogFacade`] can
//! additionally forward it to one registered [`LogSink`]; without a sink the
//! forwarded copy is dropped, never buffered.
//!
//! Components take an `Arc<LogFacade>` at construction. The process-wide
//! instance from [`LogFacade::global`] is used when none is given.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Fine-grained tracing.
    Trace,
    /// Debugging detail.
    Debug,
    /// Lifecycle transitions.
    Info,
    /// Recoverable problems.
    Warning,
    /// Failures.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Destination for scheduler diagnostics.
pub trait LogSink: Send + Sync {
    /// Receive one message.
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards diagnostics to `tracing` and at most one [`LogSink`].
#[derive(Default)]
pub struct LogFacade {
    sink: RwLock<Option<Arc<dyn LogSink>>>,
}

static GLOBAL: OnceLock<Arc<LogFacade>> = OnceLock::new();

impl LogFacade {
    /// Create a facade with no sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide facade, created on first use.
    pub fn global() -> Arc<LogFacade> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LogFacade::new())))
    }

    /// Register `sink`, replacing any previous one.
    pub fn register_sink(&self, sink: Arc<dyn LogSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Detach the registered sink, returning it.
    pub fn clear_sink(&self) -> Option<Arc<dyn LogSink>> {
        self.sink.write().take()
    }

    /// Whether a sink is registered.
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.read().is_some()
    }

    /// Emit `message` at `level`.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "cadence", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "cadence", "{message}"),
            LogLevel::Info => tracing::info!(target: "cadence", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "cadence", "{message}"),
            LogLevel::Error => tracing::error!(target: "cadence", "{message}"),
        }

        // clone out so the sink runs without the lock held
        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.log(level, message);
        }
    }

    /// Emit at [`LogLevel::Info`].
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Emit at [`LogLevel::Warning`].
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Emit at [`LogLevel::Error`].
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Emit at [`LogLevel::Debug`].
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

impl fmt::Debug for LogFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFacade")
            .field("has_sink", &self.has_sink())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(LogLevel, String)>>);

    impl LogSink for Collect {
        fn log(&self, level: LogLevel, message: &str) {
            self.0.lock().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_messages_without_sink_are_dropped() {
        let facade = LogFacade::new();
        facade.info("nobody listens");

        let sink = Arc::new(Collect::default());
        facade.register_sink(sink.clone());
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_forwarding_to_sink() {
        let facade = LogFacade::new();
        let sink = Arc::new(Collect::default());
        facade.register_sink(sink.clone());

        facade.warn("cycle failed");
        facade.log(LogLevel::Trace, "tick");

        let seen = sink.0.lock().clone();
        assert_eq!(
            seen,
            vec![
                (LogLevel::Warning, "cycle failed".to_string()),
                (LogLevel::Trace, "tick".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_sink_replaced_and_cleared() {
        let facade = LogFacade::new();
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());

        facade.register_sink(first.clone());
        facade.register_sink(second.clone());
        facade.error("boom");

        assert!(first.0.lock().is_empty());
        assert_eq!(second.0.lock().len(), 1);

        assert!(facade.clear_sink().is_some());
        assert!(!facade.has_sink());
        facade.error("dropped");
        assert_eq!(second.0.lock().len(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        let a = LogFacade::global();
        let b = LogFacade::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_level_ordering_and_display() {
        assert!(LogLevel::Error > LogLevel::Warning);
        assert_eq!(LogLevel::Warning.to_string(), "WARN");
    }
}
