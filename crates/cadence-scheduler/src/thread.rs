//! Thread primitive shared by every loop.
//!
//! A [`ThreadHandle`] owns one OS thread that repeatedly calls a
//! [`Runnable`] until it returns `false`. Name, stack size, priority and
//! scheduling policy are applied when the thread is spawned. Priority is
//! best-effort: failure to apply it is logged and the thread keeps running.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::{SchedulerError, SchedulerResult};

#[cfg(target_os = "windows")]
use crate::windows::apply_current_thread_priority;

#[cfg(target_os = "linux")]
use crate::linux::apply_current_thread_priority;

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
use crate::fallback::apply_current_thread_priority;

/// Abstract thread priority, mapped to the host's native range by the
/// platform layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum ThreadPriority {
    /// Runs only when nothing else wants the CPU.
    Idle,
    /// Lowest regular priority.
    Lowest,
    /// Below normal.
    BelowNormal,
    /// The platform default.
    #[default]
    Normal,
    /// Above normal.
    AboveNormal,
    /// Highest regular priority.
    Highest,
    /// Time critical.
    TimeCritical,
}

impl ThreadPriority {
    /// All priorities, lowest first.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::Idle,
            Self::Lowest,
            Self::BelowNormal,
            Self::Normal,
            Self::AboveNormal,
            Self::Highest,
            Self::TimeCritical,
        ]
        .into_iter()
    }

    /// Position on the abstract scale, 0 (idle) to 6 (time critical).
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Lowest => 1,
            Self::BelowNormal => 2,
            Self::Normal => 3,
            Self::AboveNormal => 4,
            Self::Highest => 5,
            Self::TimeCritical => 6,
        }
    }

    /// Inverse of [`level`](Self::level); out-of-range levels saturate.
    #[must_use]
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Idle,
            1 => Self::Lowest,
            2 => Self::BelowNormal,
            3 => Self::Normal,
            4 => Self::AboveNormal,
            5 => Self::Highest,
            _ => Self::TimeCritical,
        }
    }
}

/// Scheduling policy requested for a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SchedPolicy {
    /// Time-sharing, non real-time.
    #[default]
    Other,
    /// Real-time first-in first-out.
    Fifo,
    /// Real-time round robin.
    RoundRobin,
}

/// Parameters applied when a thread is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSpec {
    /// Thread name, visible to debuggers and `current_thread_name`.
    pub name: String,
    /// Stack size in bytes (`None` = platform default).
    pub stack_size: Option<usize>,
    /// Thread priority.
    pub priority: ThreadPriority,
    /// Scheduling policy.
    pub policy: SchedPolicy,
}

impl ThreadSpec {
    /// Create a spec with default stack, normal priority and non-RT policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            // interior NULs are rejected by the OS thread name
            name: name.into().replace('\0', " "),
            stack_size: None,
            priority: ThreadPriority::Normal,
            policy: SchedPolicy::Other,
        }
    }

    /// Set the stack size.
    #[must_use]
    pub fn with_stack_size(mut self, stack_size: Option<usize>) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the scheduling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Body of a thread: called repeatedly until it returns `false`.
pub trait Runnable: Send + 'static {
    /// Run one step. Returning `false` ends the thread.
    fn run(&mut self) -> bool;
}

impl<F> Runnable for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn run(&mut self) -> bool {
        self()
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of one OS thread.
#[derive(Debug)]
pub struct ThreadHandle {
    spec: ThreadSpec,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    // level of the priority in effect on the thread
    applied: Arc<AtomicU8>,
}

impl ThreadHandle {
    /// Create a handle; no thread exists until [`start`](Self::start).
    #[must_use]
    pub fn new(spec: ThreadSpec) -> Self {
        Self {
            spec,
            handle: None,
            running: Arc::new(AtomicBool::new(false)),
            applied: Arc::new(AtomicU8::new(ThreadPriority::Normal.level())),
        }
    }

    /// Spawn the thread and drive `runnable` on it.
    ///
    /// A no-op while a previous thread is still alive. A finished previous
    /// thread is reaped first, so a handle can be started again after its
    /// runnable returned `false`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadSpawn`] if the OS refuses to create the
    /// thread, or [`SchedulerError::ThreadPanicked`] if the previous thread
    /// being reaped had panicked.
    pub fn start<R: Runnable>(&mut self, mut runnable: R) -> SchedulerResult<()> {
        if self.is_running() {
            return Ok(());
        }
        self.join()?;

        let name = self.spec.name.clone();
        let priority = self.spec.priority;
        let policy = self.spec.policy;
        let running = Arc::clone(&self.running);
        let applied = Arc::clone(&self.applied);
        applied.store(ThreadPriority::Normal.level(), Ordering::Release);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = self.spec.stack_size {
            builder = builder.stack_size(stack_size);
        }

        self.running.store(true, Ordering::Release);
        let spawned = builder.spawn(move || {
            let _guard = RunningGuard(running);

            if priority != ThreadPriority::Normal || policy != SchedPolicy::Other {
                match apply_current_thread_priority(priority, policy) {
                    Ok(()) => applied.store(priority.level(), Ordering::Release),
                    Err(e) => {
                        tracing::debug!(thread = %name, error = %e, "Thread priority not applied");
                    }
                }
            }

            while runnable.run() {}
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(SchedulerError::thread_spawn(&self.spec.name, e))
            }
        }
    }

    /// Whether the thread has been started and its runnable has not returned
    /// `false` yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether a thread exists that has not been joined.
    #[must_use]
    pub fn is_joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Block until the thread ends. A no-op if there is no thread, or when
    /// called from the thread itself.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadPanicked`] if the thread panicked.
    pub fn join(&mut self) -> SchedulerResult<()> {
        if self.is_current() {
            return Ok(());
        }
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_panic| SchedulerError::ThreadPanicked(self.spec.name.clone())),
            None => Ok(()),
        }
    }

    /// Whether the caller is running on this handle's thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id())
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Priority in effect on the thread.
    ///
    /// `Normal` until the thread has applied its requested priority, and
    /// stays `Normal` if the platform refused it.
    #[must_use]
    pub fn priority(&self) -> ThreadPriority {
        ThreadPriority::from_level(self.applied.load(Ordering::Acquire))
    }

    /// Spawn parameters.
    #[must_use]
    pub fn spec(&self) -> &ThreadSpec {
        &self.spec
    }
}

/// Name of the calling thread, if it has one.
#[must_use]
pub fn current_thread_name() -> Option<String> {
    thread::current().name().map(str::to_string)
}
