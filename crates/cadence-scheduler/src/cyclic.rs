//! Cooperative periodic loop: one worker on one dedicated thread.
//!
//! Each cycle waits on the entry's condition variable until the next
//! cadence slot, then runs the worker once under the entry's time monitor.
//! A stop request wakes the wait and ends the thread at the next cycle
//! boundary; an in-flight `run_once` is never interrupted.
//!
//! Failures in `run_once` (errors and panics) are counted and logged and the
//! schedule continues. A configured maximum lifetime ends the loop after
//! notifying the worker with `true`; the wait is cut short when the lifetime
//! runs out before the next slot.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{SchedulerConfig, WorkerOptions};
use crate::cycle::{CycleCore, CycleRun};
use crate::error::SchedulerResult;
use crate::log::LogFacade;
use crate::stats::{EntryStats, LoopState, TimingSnapshot};
use crate::thread::{Runnable, ThreadHandle, ThreadSpec};
use crate::worker::WorkerKind;

/// Identifier of a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    /// Id of loops created outside a scheduler.
    pub const STANDALONE: EntryId = EntryId(0);

    /// Wrap a raw id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stop flag plus the condition variable the loop sleeps on.
#[derive(Default)]
struct StopSignal {
    stop: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn request(&self) {
        *self.stop.lock() = true;
        self.wake.notify_all();
    }

    fn reset(&self) {
        *self.stop.lock() = false;
    }

    /// Sleep until `deadline`. Returns `false` if a stop was requested.
    fn wait_until(&self, deadline: Instant, on_wait: impl Fn()) -> bool {
        let mut stop = self.stop.lock();
        loop {
            if *stop {
                return false;
            }
            if Instant::now() >= deadline {
                return true;
            }
            on_wait();
            // spurious wakeups fall through to the re-check above
            let _ = self.wake.wait_until(&mut stop, deadline);
        }
    }
}

struct CyclicCycle {
    run: CycleRun,
    signal: Arc<StopSignal>,
}

impl Runnable for CyclicCycle {
    fn run(&mut self) -> bool {
        let overrun = self.run.is_overrun(Instant::now());

        let core = self.run.core();
        let due = self
            .signal
            .wait_until(self.run.wake_deadline(), || core.advance_state(LoopState::Waiting));
        if !due {
            self.run.finish(LoopState::Stopped);
            return false;
        }

        let now = Instant::now();
        if self.run.lifetime_elapsed(now) {
            self.run.expire();
            return false;
        }

        self.run.execute(now, overrun);
        true
    }
}

/// One worker bound to its own thread, interval and timing monitor.
///
/// Dropping the loop requests a stop and joins the thread, so the worker is
/// never observed mid-cycle after the loop is gone.
pub struct CyclicWorkerLoop {
    core: Arc<CycleCore>,
    signal: Arc<StopSignal>,
    thread: Mutex<ThreadHandle>,
}

impl CyclicWorkerLoop {
    /// Create a standalone loop with default scheduler settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `options` are invalid.
    pub fn new(worker: WorkerKind, options: WorkerOptions) -> SchedulerResult<Self> {
        options.validate()?;
        let options = options.resolved(&SchedulerConfig::default());
        Ok(Self::build(
            EntryId::STANDALONE,
            worker,
            options,
            LogFacade::global(),
        ))
    }

    /// Create a loop from resolved options.
    pub(crate) fn build(
        id: EntryId,
        worker: WorkerKind,
        options: WorkerOptions,
        log: Arc<LogFacade>,
    ) -> Self {
        let spec = ThreadSpec::new(worker.name())
            .with_priority(options.priority)
            .with_stack_size(options.stack_size);

        Self {
            core: Arc::new(CycleCore::new(id, worker, options, log)),
            signal: Arc::new(StopSignal::default()),
            thread: Mutex::new(ThreadHandle::new(spec)),
        }
    }

    /// Start the loop thread. A no-op while the thread is alive or after the
    /// lifetime expired.
    ///
    /// Restarting a stopped loop re-baselines interval timing, so the pause
    /// is not counted as an interval fault.
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the thread cannot be created.
    pub fn schedule_work(&self) -> SchedulerResult<()> {
        let mut thread = self.thread.lock();
        if thread.is_running() {
            return Ok(());
        }

        let previous = self.core.state();
        if previous == LoopState::Expired {
            return Ok(());
        }
        thread.join()?;

        self.signal.reset();
        if previous != LoopState::Created {
            self.core.rebaseline();
        }

        self.core.set_state(LoopState::Scheduled);
        let cycle = CyclicCycle {
            run: CycleRun::new(Arc::clone(&self.core), Instant::now()),
            signal: Arc::clone(&self.signal),
        };
        if let Err(e) = thread.start(cycle) {
            self.core.set_state(previous);
            return Err(e);
        }

        tracing::debug!(
            entry = %self.core.id(),
            worker = %self.name(),
            interval = ?self.core.options().interval,
            "Worker loop scheduled"
        );
        Ok(())
    }

    /// Ask the loop to stop at its next cycle boundary without waiting.
    pub fn request_stop(&self) {
        self.core.begin_stop();
        self.signal.request();
    }

    /// Request a stop and block until the thread has ended.
    ///
    /// # Errors
    ///
    /// Returns `ThreadPanicked` if the loop thread panicked.
    pub fn stop_and_join(&self) -> SchedulerResult<()> {
        self.request_stop();
        let joined = self.thread.lock().join();
        if !self.is_running() {
            self.core.finish_stop();
        }
        joined
    }

    /// Entry id (`EntryId::STANDALONE` outside a scheduler).
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.core.id()
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.worker().name()
    }

    /// The scheduled worker.
    #[must_use]
    pub fn worker(&self) -> &WorkerKind {
        self.core.worker()
    }

    /// Resolved schedule.
    #[must_use]
    pub fn options(&self) -> &WorkerOptions {
        self.core.options()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.core.state()
    }

    /// Whether the loop thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.lock().is_running()
    }

    /// Timing statistics as of the last completed cycle.
    #[must_use]
    pub fn timing(&self) -> TimingSnapshot {
        self.core.timing()
    }

    /// Point-in-time health of this entry.
    #[must_use]
    pub fn stats(&self) -> EntryStats {
        self.core.stats()
    }
}

impl Drop for CyclicWorkerLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::warn!(entry = %self.id(), error = %e, "Worker loop ended abnormally");
        }
    }
}

impl fmt::Debug for CyclicWorkerLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicWorkerLoop")
            .field("id", &self.id())
            .field("worker", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::worker::ActionWorker;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    fn counting(name: &str) -> (WorkerKind, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let worker = ActionWorker::new(name, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (WorkerKind::action(Arc::new(worker)), count)
    }

    fn new_loop(worker: WorkerKind, options: WorkerOptions) -> CyclicWorkerLoop {
        match CyclicWorkerLoop::new(worker, options) {
            Ok(l) => l,
            Err(e) => panic!("loop rejected: {e}"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (worker, _) = counting("zero");
        assert!(CyclicWorkerLoop::new(worker, WorkerOptions::new(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_runs_periodically_and_stops() -> SchedulerResult<()> {
        let (worker, count) = counting("periodic");
        let entry = new_loop(worker, WorkerOptions::new(Duration::from_millis(5)));
        assert_eq!(entry.state(), LoopState::Created);

        entry.schedule_work()?;
        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(60));
        entry.stop_and_join()?;

        let runs = count.load(Ordering::SeqCst);
        assert!(runs >= 3, "only {runs} cycles");
        assert_eq!(entry.state(), LoopState::Stopped);
        assert_eq!(entry.stats().cycles, u64::from(runs));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), runs);
        Ok(())
    }

    #[test]
    fn test_stop_before_first_slot_runs_nothing() -> SchedulerResult<()> {
        let (worker, count) = counting("idle");
        let entry = new_loop(worker, WorkerOptions::new(Duration::from_secs(10)));
        entry.schedule_work()?;

        let started = Instant::now();
        entry.stop_and_join()?;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_panicking_cycle_is_counted() -> SchedulerResult<()> {
        let runs = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&runs);
        let worker = ActionWorker::new("panicky", move || {
            if r.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first cycle fails");
            }
        });
        let entry = new_loop(
            WorkerKind::action(Arc::new(worker)),
            WorkerOptions::new(Duration::from_millis(5)),
        );

        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(50));
        entry.stop_and_join()?;

        let stats = entry.stats();
        assert_eq!(stats.execution_errors, 1);
        assert!(stats.cycles >= 2);
        Ok(())
    }

    #[test]
    fn test_restart_after_stop() -> SchedulerResult<()> {
        let (worker, count) = counting("restart");
        let entry = new_loop(worker, WorkerOptions::new(Duration::from_millis(5)));

        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(30));
        entry.stop_and_join()?;
        let first = count.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(100));
        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(30));
        entry.stop_and_join()?;

        assert!(count.load(Ordering::SeqCst) > first);
        // the pause is not measured as an interval
        assert!(entry.timing().max_interval < Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn test_lifetime_expiry() -> SchedulerResult<()> {
        let (worker, count) = counting("short-lived");
        let options = WorkerOptions::new(Duration::from_millis(10))
            .with_max_duration(Duration::from_millis(55));
        let entry = new_loop(worker, options);

        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(150));

        assert_eq!(entry.state(), LoopState::Expired);
        assert!(!entry.is_running());
        let runs = count.load(Ordering::SeqCst);
        assert!((4..=6).contains(&runs), "{runs} cycles");

        entry.schedule_work()?;
        assert!(!entry.is_running());
        Ok(())
    }

    #[test]
    fn test_lifetime_shorter_than_interval_expires_on_time() -> SchedulerResult<()> {
        let (worker, count) = counting("brief");
        let options = WorkerOptions::new(Duration::from_secs(1))
            .with_max_duration(Duration::from_millis(50));
        let entry = new_loop(worker, options);

        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(300));

        assert_eq!(entry.state(), LoopState::Expired);
        assert!(!entry.is_running());
        assert_eq!(entry.stats().timeouts, 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_stop_after_expiry_keeps_expired() -> SchedulerResult<()> {
        let (worker, _) = counting("expired-then-stopped");
        let options = WorkerOptions::new(Duration::from_millis(5))
            .with_max_duration(Duration::from_millis(20));
        let entry = new_loop(worker, options);

        entry.schedule_work()?;
        thread::sleep(Duration::from_millis(100));
        entry.stop_and_join()?;

        assert_eq!(entry.state(), LoopState::Expired);
        entry.schedule_work()?;
        assert!(!entry.is_running());
        assert_eq!(entry.stats().timeouts, 1);
        Ok(())
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        let (worker, _) = counting("forever-away");
        let result = CyclicWorkerLoop::new(worker, WorkerOptions::new(Duration::MAX));
        assert!(matches!(result, Err(SchedulerError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_entry_id_display() {
        assert_eq!(EntryId::new(7).to_string(), "#7");
        assert_eq!(EntryId::STANDALONE.value(), 0);
    }
}
