//! Units of periodic work.
//!
//! A worker is either a [`ScheduledWorker`] implementation or a bare closure
//! wrapped in an [`ActionWorker`]. [`WorkerKind`] carries the choice made at
//! attach time. Workers are held by `Arc`, so a worker outlives every loop
//! that runs it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::error::WorkerResult;

/// Callback receiving duration timeout (`true`) and heartbeat (`false`)
/// notifications.
pub type TimeoutCallback = Box<dyn Fn(bool) + Send + Sync>;

/// One logical unit of repeating work.
pub trait ScheduledWorker: Send + Sync {
    /// Execute one cycle.
    ///
    /// # Errors
    ///
    /// A failed cycle is counted and logged by the loop; the schedule continues.
    fn run_once(&self) -> WorkerResult;

    /// Name used for logging and thread naming. Not required to be unique.
    fn worker_name(&self) -> &str;

    /// Called with `true` when a cycle overran its expected duration or the
    /// maximum lifetime elapsed, and with `false` as a periodic heartbeat.
    fn notify_duration_timeout(&self, is_timeout: bool) {
        let _ = is_timeout;
    }
}

/// Adapter turning a closure into a worker.
pub struct ActionWorker {
    name: String,
    action: Mutex<Box<dyn FnMut() + Send>>,
    on_timeout: Option<TimeoutCallback>,
}

impl ActionWorker {
    /// Wrap `action` under `name`.
    pub fn new(name: impl Into<String>, action: impl FnMut() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            action: Mutex::new(Box::new(action)),
            on_timeout: None,
        }
    }

    /// Attach a timeout callback.
    #[must_use]
    pub fn with_timeout_callback(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Box::new(callback));
        self
    }

    /// Whether a timeout callback is set.
    #[must_use]
    pub fn has_timeout_callback(&self) -> bool {
        self.on_timeout.is_some()
    }
}

impl ScheduledWorker for ActionWorker {
    fn run_once(&self) -> WorkerResult {
        let mut action = self.action.lock();
        (*action)();
        Ok(())
    }

    fn worker_name(&self) -> &str {
        &self.name
    }

    fn notify_duration_timeout(&self, is_timeout: bool) {
        if let Some(callback) = &self.on_timeout {
            callback(is_timeout);
        }
    }
}

impl fmt::Debug for ActionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionWorker")
            .field("name", &self.name)
            .field("has_timeout_callback", &self.has_timeout_callback())
            .finish()
    }
}

/// A worker as chosen at attach time.
#[derive(Clone)]
pub enum WorkerKind {
    /// A full [`ScheduledWorker`] implementation.
    Rich(Arc<dyn ScheduledWorker>),
    /// A closure adapted by [`ActionWorker`].
    Action(Arc<ActionWorker>),
}

impl WorkerKind {
    /// Wrap a worker implementation.
    pub fn rich<W: ScheduledWorker + 'static>(worker: Arc<W>) -> Self {
        Self::Rich(worker)
    }

    /// Wrap a closure adapter.
    #[must_use]
    pub fn action(worker: Arc<ActionWorker>) -> Self {
        Self::Action(worker)
    }

    /// Execute one cycle.
    ///
    /// # Errors
    ///
    /// Propagates the worker's error.
    pub fn run_once(&self) -> WorkerResult {
        match self {
            Self::Rich(worker) => worker.run_once(),
            Self::Action(worker) => worker.run_once(),
        }
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Rich(worker) => worker.worker_name(),
            Self::Action(worker) => worker.worker_name(),
        }
    }

    /// Deliver a timeout or heartbeat notification.
    pub fn notify_duration_timeout(&self, is_timeout: bool) {
        match self {
            Self::Rich(worker) => worker.notify_duration_timeout(is_timeout),
            Self::Action(worker) => worker.notify_duration_timeout(is_timeout),
        }
    }

    /// Whether both refer to the same worker instance.
    #[must_use]
    pub fn same_instance(&self, other: &WorkerKind) -> bool {
        self.instance_ptr() == other.instance_ptr()
    }

    /// Whether this is a closure adapter.
    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }

    fn instance_ptr(&self) -> *const () {
        match self {
            Self::Rich(worker) => Arc::as_ptr(worker).cast::<()>(),
            Self::Action(worker) => Arc::as_ptr(worker).cast::<()>(),
        }
    }
}

impl fmt::Debug for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_action() { "Action" } else { "Rich" };
        f.debug_struct("WorkerKind")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}
