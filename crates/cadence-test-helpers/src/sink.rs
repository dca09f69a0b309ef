//! A log sink that keeps every message.

use cadence_scheduler::{LogLevel, LogSink};
use parking_lot::Mutex;

/// Records every message for later assertions.
#[derive(Debug, Default)]
pub struct CapturingSink {
    messages: Mutex<Vec<(LogLevel, String)>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(LogLevel, String)> {
        self.messages.lock().clone()
    }

    pub fn count_at(&self, level: LogLevel) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|(_, m)| m.contains(needle))
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl LogSink for CapturingSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}
