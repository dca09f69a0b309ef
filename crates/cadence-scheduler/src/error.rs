//! Error types for the scheduler crate.
//!
//! Two families live here: [`SchedulerError`] is returned synchronously from
//! the attach/activate surface, while [`WorkerError`] is what a worker cycle
//! may produce. Worker errors never leave the loop thread; they are counted
//! and logged at the cycle boundary.

use thiserror::Error;

use crate::cyclic::EntryId;

/// Errors reported by the scheduler and its loops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Attaching would exceed the configured worker limit.
    #[error("Worker capacity exceeded: at most {max} workers may be attached")]
    CapacityExceeded {
        /// The configured maximum.
        max: usize,
    },

    /// The same worker instance is already attached.
    #[error("Worker '{0}' is already attached")]
    DuplicateWorker(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The operating system refused to create a thread.
    #[error("Failed to spawn thread '{name}': {reason}")]
    ThreadSpawn {
        /// Requested thread name.
        name: String,
        /// Underlying OS error.
        reason: String,
    },

    /// A joined thread had panicked.
    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),

    /// Thread priority or scheduling policy could not be applied.
    #[error("Failed to apply thread priority: {0}")]
    PrioritySetupFailed(String),

    /// No entry with this id is attached.
    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),
}

impl SchedulerError {
    /// Create a capacity error.
    #[must_use]
    pub fn capacity_exceeded(max: usize) -> Self {
        Self::CapacityExceeded { max }
    }

    /// Create a duplicate worker error.
    #[must_use]
    pub fn duplicate_worker(name: impl Into<String>) -> Self {
        Self::DuplicateWorker(name.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create a thread spawn error.
    #[must_use]
    pub fn thread_spawn(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ThreadSpawn {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a priority setup error.
    #[must_use]
    pub fn priority_setup_failed(reason: impl Into<String>) -> Self {
        Self::PrioritySetupFailed(reason.into())
    }
}

/// A specialized `Result` type for scheduler operations.
pub type SchedulerResult<T = ()> = std::result::Result<T, SchedulerError>;

/// Failure of a single worker cycle.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The worker panicked; the payload message is preserved when it was a string.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// Any other error source.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkerError {
    /// Create a failure with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Build a [`WorkerError::Panicked`] from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Result of one worker cycle.
pub type WorkerResult = std::result::Result<(), WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::capacity_exceeded(4);
        assert!(err.to_string().contains('4'));

        let err = SchedulerError::thread_spawn("worker-a", "resource temporarily unavailable");
        assert!(err.to_string().contains("worker-a"));
        assert!(err.to_string().contains("resource temporarily unavailable"));
    }

    #[test]
    fn test_error_constructors() {
        let err = SchedulerError::duplicate_worker("poller");
        assert!(matches!(err, SchedulerError::DuplicateWorker(_)));

        let err = SchedulerError::invalid_configuration("interval must be greater than 0");
        assert!(matches!(err, SchedulerError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_worker_error_from_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = WorkerError::from_panic(payload.as_ref());
        assert_eq!(err.to_string(), "worker panicked: boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        let err = WorkerError::from_panic(payload.as_ref());
        assert_eq!(err.to_string(), "worker panicked: owned boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        let err = WorkerError::from_panic(payload.as_ref());
        assert!(matches!(err, WorkerError::Panicked(_)));
    }

    #[test]
    fn test_worker_error_from_boxed_source() {
        let source: Box<dyn std::error::Error + Send + Sync> = "io went away".into();
        let err = WorkerError::from(source);
        assert_eq!(err.to_string(), "io went away");
    }
}
