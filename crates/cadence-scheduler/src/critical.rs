//! Non-interruptible periodic loop.
//!
//! [`CriticalWorkerLoop`] keeps the same timing and fault bookkeeping as
//! [`CyclicWorkerLoop`](crate::cyclic::CyclicWorkerLoop) but sleeps with the
//! platform's precise sleep instead of a condition variable. A stop request
//! cannot wake it: the current wait and run always complete, and the loop
//! ends at the following cycle boundary.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::{SchedulerConfig, WorkerOptions};
use crate::cycle::{CycleCore, CycleRun};
use crate::cyclic::EntryId;
use crate::error::SchedulerResult;
use crate::log::LogFacade;
use crate::stats::{EntryStats, LoopState, TimingSnapshot};
use crate::thread::{Runnable, SchedPolicy, ThreadHandle, ThreadPriority, ThreadSpec};
use crate::worker::WorkerKind;

#[cfg(target_os = "windows")]
use crate::windows::PlatformSleep;

#[cfg(target_os = "linux")]
use crate::linux::PlatformSleep;

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
use crate::fallback::PlatformSleep;

struct CriticalCycle {
    run: CycleRun,
    terminated: Arc<AtomicBool>,
    sleeper: PlatformSleep,
}

impl Runnable for CriticalCycle {
    fn run(&mut self) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            self.run.finish(LoopState::Stopped);
            return false;
        }

        let overrun = self.run.is_overrun(Instant::now());
        self.run.core().advance_state(LoopState::Waiting);
        self.sleeper.sleep_until(self.run.wake_deadline());

        let now = Instant::now();
        if self.run.lifetime_elapsed(now) {
            self.run.expire();
            return false;
        }
        if now < self.run.next_slot() {
            // woke for a lifetime end that has not quite arrived
            return true;
        }

        self.run.execute(now, overrun);
        true
    }
}

/// A worker loop that is never woken early.
pub struct CriticalWorkerLoop {
    core: Arc<CycleCore>,
    terminated: Arc<AtomicBool>,
    thread: Mutex<ThreadHandle>,
}

impl CriticalWorkerLoop {
    /// Create a loop running `worker` every `interval` at `priority`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero interval.
    pub fn new(
        worker: WorkerKind,
        interval: Duration,
        priority: ThreadPriority,
    ) -> SchedulerResult<Self> {
        Self::with_options(worker, WorkerOptions::new(interval).with_priority(priority))
    }

    /// Create a loop from full options.
    ///
    /// Priorities above normal request the round-robin real-time policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `options` are invalid.
    pub fn with_options(
        worker: WorkerKind,
        options: WorkerOptions,
    ) -> SchedulerResult<Self> {
        options.validate()?;
        let options = options.resolved(&SchedulerConfig::default());

        let policy = if options.priority > ThreadPriority::Normal {
            SchedPolicy::RoundRobin
        } else {
            SchedPolicy::Other
        };
        let spec = ThreadSpec::new(worker.name())
            .with_priority(options.priority)
            .with_policy(policy)
            .with_stack_size(options.stack_size);

        Ok(Self {
            core: Arc::new(CycleCore::new(
                EntryId::STANDALONE,
                worker,
                options,
                LogFacade::global(),
            )),
            terminated: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(ThreadHandle::new(spec)),
        })
    }

    /// Start the loop thread. A no-op while the thread is alive or after the
    /// lifetime expired.
    ///
    /// # Errors
    ///
    /// Returns `ThreadSpawn` if the thread cannot be created.
    pub fn start(&self) -> SchedulerResult<()> {
        let mut thread = self.thread.lock();
        if thread.is_running() {
            return Ok(());
        }

        let previous = self.core.state();
        if previous == LoopState::Expired {
            return Ok(());
        }
        thread.join()?;

        self.terminated.store(false, Ordering::Release);
        if previous != LoopState::Created {
            self.core.rebaseline();
        }

        self.core.set_state(LoopState::Scheduled);
        let cycle = CriticalCycle {
            run: CycleRun::new(Arc::clone(&self.core), Instant::now()),
            terminated: Arc::clone(&self.terminated),
            sleeper: PlatformSleep::new(),
        };
        if let Err(e) = thread.start(cycle) {
            self.core.set_state(previous);
            return Err(e);
        }

        self.core.log().debug(&format!(
            "Critical loop '{}' started",
            self.core.worker().name()
        ));
        Ok(())
    }

    /// Ask the loop to end after its current wait and run.
    pub fn request_stop(&self) {
        self.core.begin_stop();
        self.terminated.store(true, Ordering::Release);
    }

    /// Request a stop and block until the thread has ended. This may take up
    /// to one interval plus one `run_once`.
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

    /// Whether the loop thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.lock().is_running()
    }

    /// Worker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.worker().name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.core.state()
    }

    /// Timing statistics as of the last completed cycle.
    #[must_use]
    pub fn timing(&self) -> TimingSnapshot {
        self.core.timing()
    }

    /// Point-in-time health of this loop.
    #[must_use]
    pub fn stats(&self) -> EntryStats {
        self.core.stats()
    }
}

impl Drop for CriticalWorkerLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::warn!(worker = %self.name(), error = %e, "Critical loop ended abnormally");
        }
    }
}

impl fmt::Debug for CriticalWorkerLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalWorkerLoop")
            .field("worker", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ActionWorker;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    fn counting(name: &str) -> (WorkerKind, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let worker = ActionWorker::new(name, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (WorkerKind::action(Arc::new(worker)), count)
    }

    #[test]
    fn test_runs_and_stops_at_boundary() -> SchedulerResult<()> {
        let (worker, count) = counting("critical");
        let critical = CriticalWorkerLoop::new(worker, Duration::from_millis(5), ThreadPriority::Normal)?;

        critical.start()?;
        critical.start()?;
        thread::sleep(Duration::from_millis(60));
        critical.stop_and_join()?;

        let runs = count.load(Ordering::SeqCst);
        assert!(runs >= 3, "only {runs} cycles");
        assert_eq!(critical.state(), LoopState::Stopped);
        assert_eq!(critical.stats().cycles, u64::from(runs));
        Ok(())
    }

    #[test]
    fn test_stop_does_not_cut_the_wait_short() -> SchedulerResult<()> {
        let (worker, count) = counting("uninterruptible");
        let critical =
            CriticalWorkerLoop::new(worker, Duration::from_millis(80), ThreadPriority::Normal)?;

        critical.start()?;
        thread::sleep(Duration::from_millis(10));
        let requested = Instant::now();
        critical.stop_and_join()?;

        // the pending wait and run completed before the thread ended
        assert!(requested.elapsed() >= Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_raised_priority_still_runs() -> SchedulerResult<()> {
        let (worker, count) = counting("rt");
        let critical = CriticalWorkerLoop::new(
            worker,
            Duration::from_millis(2),
            ThreadPriority::TimeCritical,
        )?;

        critical.start()?;
        thread::sleep(Duration::from_millis(30));
        critical.stop_and_join()?;

        assert!(count.load(Ordering::SeqCst) > 0);
        Ok(())
    }

    #[test]
    fn test_lifetime_ends_the_wait_early() -> SchedulerResult<()> {
        let (worker, count) = counting("critical-brief");
        let critical = CriticalWorkerLoop::with_options(
            worker,
            WorkerOptions::new(Duration::from_secs(1)).with_max_duration(Duration::from_millis(40)),
        )?;

        critical.start()?;
        thread::sleep(Duration::from_millis(250));

        assert_eq!(critical.state(), LoopState::Expired);
        assert!(!critical.is_running());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        critical.stop_and_join()?;
        assert_eq!(critical.state(), LoopState::Expired);
        Ok(())
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (worker, _) = counting("zero");
        assert!(CriticalWorkerLoop::new(worker, Duration::ZERO, ThreadPriority::Normal).is_err());
    }
}
