//! Top-level scheduler owning a set of worker loops.
//!
//! The scheduler keeps every attached entry in one collection guarded by a
//! single mutex, and runs a supervisory loop on its own thread that wakes
//! every `sync_interval` to remove entries whose lifetime expired.
//!
//! The collection lock is never held while joining: entries are cloned out
//! before they are stopped.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{SchedulerConfig, WorkerOptions};
use crate::cyclic::{CyclicWorkerLoop, EntryId};
use crate::error::{SchedulerError, SchedulerResult};
use crate::log::LogFacade;
use crate::stats::{EntryStats, LoopState};
use crate::thread::{Runnable, ThreadHandle, ThreadPriority, ThreadSpec};
use crate::worker::{ActionWorker, ScheduledWorker, WorkerKind};

/// Name of the supervisory thread.
pub const SUPERVISOR_THREAD_NAME: &str = "cadence-supervisor";

struct SchedulerShared {
    config: SchedulerConfig,
    log: Arc<LogFacade>,
    entries: Mutex<Vec<Arc<CyclicWorkerLoop>>>,
    agents: Mutex<Vec<Arc<ActionWorker>>>,
    active: AtomicBool,
    terminated: Mutex<bool>,
    wake: Condvar,
    next_id: AtomicU64,
    supervisor_ticks: AtomicU64,
}

impl SchedulerShared {
    fn snapshot(&self) -> Vec<Arc<CyclicWorkerLoop>> {
        self.entries.lock().clone()
    }

    fn forget_agent(&self, entry: &CyclicWorkerLoop) {
        if let WorkerKind::Action(action) = entry.worker() {
            self.agents.lock().retain(|a| !Arc::ptr_eq(a, action));
        }
    }

    /// Remove entries whose maximum lifetime elapsed. Returns how many.
    fn sweep_expired(&self) -> usize {
        let expired: Vec<Arc<CyclicWorkerLoop>> = {
            let mut entries = self.entries.lock();
            let (expired, live) = entries
                .drain(..)
                .partition(|entry| entry.state() == LoopState::Expired);
            *entries = live;
            expired
        };

        for entry in &expired {
            self.forget_agent(entry);
            self.log.info(&format!(
                "Removed expired worker '{}' ({})",
                entry.name(),
                entry.id()
            ));
        }
        expired.len()
    }
}

/// The scheduler's own cycle: sleep one sync tick, then do bookkeeping.
struct SupervisorCycle {
    shared: Arc<SchedulerShared>,
}

impl Runnable for SupervisorCycle {
    fn run(&mut self) -> bool {
        {
            let mut terminated = self.shared.terminated.lock();
            if !*terminated {
                let _ = self
                    .shared
                    .wake
                    .wait_for(&mut terminated, self.shared.config.sync_interval);
            }
            if *terminated {
                return false;
            }
        }

        let removed = self.shared.sweep_expired();
        let tick = self.shared.supervisor_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if removed > 0 {
            tracing::debug!(tick, removed, "Supervisor removed expired entries");
        }
        true
    }
}

/// Owner and supervisor of periodic worker loops.
///
/// # Example
///
/// ```
/// use cadence_scheduler::prelude::*;
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new(SchedulerConfig::default())?;
/// scheduler.attach_action("tick", || {}, Duration::from_millis(10), ThreadPriority::Normal)?;
/// scheduler.activate()?;
/// assert_eq!(scheduler.worker_count(), 1);
/// scheduler.deactivate()?;
/// # Ok::<(), SchedulerError>(())
/// ```
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    control: Mutex<ThreadHandle>,
}

impl Scheduler {
    /// Create a scheduler logging through the process-wide facade.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` is invalid.
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        Self::with_log(config, LogFacade::global())
    }

    /// Create a scheduler logging through `log`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `config` is invalid.
    pub fn with_log(config: SchedulerConfig, log: Arc<LogFacade>) -> SchedulerResult<Self> {
        config.validate()?;

        let spec = ThreadSpec::new(SUPERVISOR_THREAD_NAME).with_priority(config.control_priority);
        Ok(Self {
            shared: Arc::new(SchedulerShared {
                config,
                log,
                entries: Mutex::new(Vec::new()),
                agents: Mutex::new(Vec::new()),
                active: AtomicBool::new(false),
                terminated: Mutex::new(false),
                wake: Condvar::new(),
                next_id: AtomicU64::new(0),
                supervisor_ticks: AtomicU64::new(0),
            }),
            control: Mutex::new(ThreadHandle::new(spec)),
        })
    }

    /// Attach `worker` to run every `interval`.
    ///
    /// # Errors
    ///
    /// See [`attach_with_options`](Self::attach_with_options).
    pub fn attach<W: ScheduledWorker + 'static>(
        &self,
        worker: Arc<W>,
        interval: Duration,
        priority: ThreadPriority,
    ) -> SchedulerResult<EntryId> {
        self.attach_with_options(
            WorkerKind::rich(worker),
            WorkerOptions::new(interval).with_priority(priority),
        )
    }

    /// Attach `worker` with a maximum lifetime; zero means unbounded.
    ///
    /// # Errors
    ///
    /// See [`attach_with_options`](Self::attach_with_options).
    pub fn attach_with_lifetime<W: ScheduledWorker + 'static>(
        &self,
        worker: Arc<W>,
        priority: ThreadPriority,
        interval: Duration,
        max_duration: Duration,
    ) -> SchedulerResult<EntryId> {
        self.attach_with_options(
            WorkerKind::rich(worker),
            WorkerOptions::new(interval)
                .with_priority(priority)
                .with_max_duration(max_duration),
        )
    }

    /// Attach a closure as a named agent.
    ///
    /// # Errors
    ///
    /// See [`attach_with_options`](Self::attach_with_options).
    pub fn attach_action(
        &self,
        name: impl Into<String>,
        action: impl FnMut() + Send + 'static,
        interval: Duration,
        priority: ThreadPriority,
    ) -> SchedulerResult<EntryId> {
        let agent = Arc::new(ActionWorker::new(name, action));
        self.attach_with_options(
            WorkerKind::action(agent),
            WorkerOptions::new(interval).with_priority(priority),
        )
    }

    /// Attach a closure as a named agent with a timeout callback.
    ///
    /// # Errors
    ///
    /// See [`attach_with_options`](Self::attach_with_options).
    pub fn attach_action_with_timeout(
        &self,
        name: impl Into<String>,
        action: impl FnMut() + Send + 'static,
        interval: Duration,
        priority: ThreadPriority,
        on_timeout: impl Fn(bool) + Send + Sync + 'static,
    ) -> SchedulerResult<EntryId> {
        let agent = Arc::new(ActionWorker::new(name, action).with_timeout_callback(on_timeout));
        self.attach_with_options(
            WorkerKind::action(agent),
            WorkerOptions::new(interval).with_priority(priority),
        )
    }

    /// Attach a worker with a full schedule.
    ///
    /// While the scheduler is active the entry's thread is started before
    /// this returns.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` if `options` are invalid.
    /// - `CapacityExceeded` if `max_workers` entries are already attached.
    /// - `DuplicateWorker` if the instance is already attached and
    ///   duplicates are rejected.
    /// - `ThreadSpawn` if the entry's thread could not be started; the entry
    ///   is not kept.
    pub fn attach_with_options(
        &self,
        worker: WorkerKind,
        options: WorkerOptions,
    ) -> SchedulerResult<EntryId> {
        options.validate()?;
        let options = options.resolved(&self.shared.config);
        let max = self.shared.config.max_workers;

        let mut entries = self.shared.entries.lock();
        if entries.len() >= max {
            return Err(SchedulerError::capacity_exceeded(max));
        }
        if self.shared.config.reject_duplicate_workers
            && entries.iter().any(|e| e.worker().same_instance(&worker))
        {
            return Err(SchedulerError::duplicate_worker(worker.name()));
        }

        let id = EntryId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let agent = match &worker {
            WorkerKind::Action(action) => Some(Arc::clone(action)),
            WorkerKind::Rich(_) => None,
        };
        let entry = Arc::new(CyclicWorkerLoop::build(
            id,
            worker,
            options,
            Arc::clone(&self.shared.log),
        ));

        if self.is_active() {
            entry.schedule_work()?;
        }
        entries.push(Arc::clone(&entry));
        if let Some(agent) = agent {
            self.shared.agents.lock().push(agent);
        }
        let count = entries.len();
        drop(entries);

        self.shared.log.info(&format!(
            "Attached worker '{}' ({id}), {count}/{max} workers",
            entry.name()
        ));
        Ok(id)
    }

    /// Stop, join and remove one entry.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if no entry has this id, or `ThreadPanicked`
    /// if its thread panicked.
    pub fn detach(&self, id: EntryId) -> SchedulerResult<()> {
        let entry = {
            let mut entries = self.shared.entries.lock();
            let index = entries
                .iter()
                .position(|e| e.id() == id)
                .ok_or(SchedulerError::EntryNotFound(id))?;
            entries.remove(index)
        };

        self.shared.forget_agent(&entry);
        let stopped = entry.stop_and_join();
        self.shared
            .log
            .info(&format!("Detached worker '{}' ({id})", entry.name()));
        stopped
    }

    /// Start the supervisory loop and every attached entry.
    ///
    /// Entries stopped by an earlier [`deactivate`](Self::deactivate) resume
    /// without counting the pause as an interval fault. An entry whose
    /// thread cannot be started is logged and left stopped. A no-op while
    /// active.
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the supervisory thread cannot be started.
    pub fn activate(&self) -> SchedulerResult<()> {
        let mut control = self.control.lock();
        if self.shared.active.load(Ordering::Acquire) {
            return Ok(());
        }

        *self.shared.terminated.lock() = false;
        control.start(SupervisorCycle {
            shared: Arc::clone(&self.shared),
        })?;
        self.shared.active.store(true, Ordering::Release);

        let entries = self.shared.snapshot();
        for entry in &entries {
            if let Err(e) = entry.schedule_work() {
                self.shared.log.error(&format!(
                    "Failed to start worker '{}' ({}): {e}",
                    entry.name(),
                    entry.id()
                ));
            }
        }

        self.shared.log.info(&format!(
            "Scheduler activated with {} workers",
            entries.len()
        ));
        Ok(())
    }

    /// Stop the supervisory loop and every entry, returning once all their
    /// threads have been joined. A no-op while inactive.
    ///
    /// # Errors
    ///
    /// Returns `ThreadPanicked` if the supervisory thread or an entry thread
    /// panicked; every thread is still joined.
    pub fn deactivate(&self) -> SchedulerResult<()> {
        let mut control = self.control.lock();
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        {
            let mut terminated = self.shared.terminated.lock();
            *terminated = true;
            self.shared.wake.notify_all();
        }
        let mut result = control.join();

        let entries = self.shared.snapshot();
        // signal every entry first so they wind down in parallel
        for entry in &entries {
            entry.request_stop();
        }
        for entry in &entries {
            if let Err(e) = entry.stop_and_join() {
                self.shared
                    .log
                    .error(&format!("Worker '{}' ended abnormally: {e}", entry.name()));
                result = result.and(Err(e));
            }
        }

        self.shared.log.info(&format!(
            "Scheduler deactivated, {} workers stopped",
            entries.len()
        ));
        result
    }

    /// Wake the supervisory loop for an immediate bookkeeping pass.
    pub fn request_sync(&self) {
        self.shared.wake.notify_all();
    }

    /// Whether the scheduler is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Number of attached entries.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Number of attached closure agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.shared.agents.lock().len()
    }

    /// Ids of attached entries in attach order.
    #[must_use]
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.shared.entries.lock().iter().map(|e| e.id()).collect()
    }

    /// Health of every attached entry in attach order.
    #[must_use]
    pub fn stats(&self) -> Vec<EntryStats> {
        self.shared
            .snapshot()
            .iter()
            .map(|entry| entry.stats())
            .collect()
    }

    /// Health of one entry.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if no entry has this id.
    pub fn entry_stats(&self, id: EntryId) -> SchedulerResult<EntryStats> {
        self.shared
            .entries
            .lock()
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.stats())
            .ok_or(SchedulerError::EntryNotFound(id))
    }

    /// Completed supervisory cycles.
    #[must_use]
    pub fn supervisor_ticks(&self) -> u64 {
        self.shared.supervisor_ticks.load(Ordering::Relaxed)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Log facade used by this scheduler and its entries.
    #[must_use]
    pub fn log(&self) -> &Arc<LogFacade> {
        &self.shared.log
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.deactivate() {
            tracing::warn!(error = %e, "Scheduler shut down with errors");
        }
        // entries join their threads as they drop
        let entries: Vec<_> = self.shared.entries.lock().drain(..).collect();
        self.shared.agents.lock().clear();
        drop(entries);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.is_active())
            .field("workers", &self.worker_count())
            .field("agents", &self.agent_count())
            .field("config", &self.shared.config)
            .finish()
    }
}
