//! Cycle bookkeeping shared by the cyclic and critical loops.
//!
//! [`CycleCore`] is the per-entry state other threads may read. [`CycleRun`]
//! is owned by the loop thread for one run of the entry and performs the
//! measured call into the worker.

use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cadence::{Cadence, instant_after};
use crate::config::{DURATION_MSG_INTERVAL, WorkerOptions};
use crate::cyclic::EntryId;
use crate::error::WorkerError;
use crate::log::LogFacade;
use crate::stats::{AtomicLoopState, EntryStats, LoopCounters, LoopState, TimingSnapshot};
use crate::time_monitor::TimeMonitor;
use crate::worker::WorkerKind;

pub(crate) struct CycleCore {
    id: EntryId,
    worker: WorkerKind,
    options: WorkerOptions,
    heartbeat_cycles: u32,
    // written only by the loop thread, or while no thread exists
    monitor: Mutex<TimeMonitor>,
    timing: RwLock<TimingSnapshot>,
    counters: LoopCounters,
    state: AtomicLoopState,
    lifetime_used: Mutex<Duration>,
    log: Arc<LogFacade>,
}

impl CycleCore {
    pub(crate) fn new(
        id: EntryId,
        worker: WorkerKind,
        options: WorkerOptions,
        log: Arc<LogFacade>,
    ) -> Self {
        let expected_duration = options.expected_duration.unwrap_or(options.interval);
        let interval_deviation = options.interval_deviation.unwrap_or_default();
        let monitor = TimeMonitor::new(expected_duration, options.interval)
            .with_deviation(options.duration_deviation, interval_deviation);
        let heartbeat_cycles = options
            .heartbeat_cycles
            .unwrap_or(DURATION_MSG_INTERVAL)
            .max(1);

        Self {
            id,
            worker,
            options,
            heartbeat_cycles,
            timing: RwLock::new(monitor.snapshot()),
            monitor: Mutex::new(monitor),
            counters: LoopCounters::default(),
            state: AtomicLoopState::new(LoopState::Created),
            lifetime_used: Mutex::new(Duration::ZERO),
            log,
        }
    }

    pub(crate) fn id(&self) -> EntryId {
        self.id
    }

    pub(crate) fn worker(&self) -> &WorkerKind {
        &self.worker
    }

    pub(crate) fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub(crate) fn log(&self) -> &LogFacade {
        &self.log
    }

    pub(crate) fn state(&self) -> LoopState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: LoopState) {
        self.state.store(state);
    }

    pub(crate) fn advance_state(&self, state: LoopState) {
        self.state.advance(state);
    }

    /// Mark a live entry as stopping without clobbering an expiry.
    pub(crate) fn begin_stop(&self) {
        self.state.begin_stop();
    }

    /// Settle a pending stop once the thread has ended.
    pub(crate) fn finish_stop(&self) {
        self.state.finish_stop();
    }

    /// Forget the last cycle start so a pause is not measured as an interval.
    pub(crate) fn rebaseline(&self) {
        self.monitor.lock().reset_interval_timing(false);
    }

    pub(crate) fn timing(&self) -> TimingSnapshot {
        *self.timing.read()
    }

    pub(crate) fn stats(&self) -> EntryStats {
        EntryStats {
            id: self.id.value(),
            name: self.worker.name().to_string(),
            state: self.state(),
            cycles: self.counters.cycles(),
            execution_errors: self.counters.execution_errors(),
            heartbeats: self.counters.heartbeats(),
            timeouts: self.counters.timeouts(),
            timing: self.timing(),
        }
    }

    fn notify(&self, is_timeout: bool) {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.worker.notify_duration_timeout(is_timeout);
        }));
        if delivered.is_err() {
            self.log.error(&format!(
                "Worker '{}' panicked in its timeout notification",
                self.worker.name()
            ));
        }
    }

    fn record_error(&self, error: &WorkerError) {
        let total = self.counters.inc_execution_errors();
        self.log.warn(&format!(
            "Worker '{}' cycle failed ({total} total): {error}",
            self.worker.name()
        ));
    }
}

/// One run of an entry, from thread start to thread end.
pub(crate) struct CycleRun {
    core: Arc<CycleCore>,
    cadence: Cadence,
    started: Instant,
    carried: Duration,
    healthy_cycles: u32,
}

impl CycleRun {
    pub(crate) fn new(core: Arc<CycleCore>, anchor: Instant) -> Self {
        let carried = *core.lifetime_used.lock();
        let cadence = Cadence::new(core.options.interval, anchor);
        Self {
            core,
            cadence,
            started: anchor,
            carried,
            healthy_cycles: 0,
        }
    }

    pub(crate) fn core(&self) -> &CycleCore {
        &self.core
    }

    pub(crate) fn next_slot(&self) -> Instant {
        self.cadence.next_slot()
    }

    /// Instant at which the remaining lifetime runs out, if one is set.
    pub(crate) fn expires_at(&self) -> Option<Instant> {
        self.core
            .options
            .lifetime()
            .map(|lifetime| instant_after(self.started, lifetime.saturating_sub(self.carried)))
    }

    /// End of the next wait: the next slot, or the lifetime end if sooner.
    pub(crate) fn wake_deadline(&self) -> Instant {
        let slot = self.cadence.next_slot();
        self.expires_at().map_or(slot, |expiry| expiry.min(slot))
    }

    /// Whether the previous cycle ran past the slot now due.
    pub(crate) fn is_overrun(&self, now: Instant) -> bool {
        self.cadence.is_overrun(now)
    }

    /// Whether the total running time across runs reached the lifetime.
    pub(crate) fn lifetime_elapsed(&self, now: Instant) -> bool {
        self.core.options.lifetime().is_some_and(|lifetime| {
            self.carried
                .saturating_add(now.saturating_duration_since(self.started))
                >= lifetime
        })
    }

    /// Record the end of this run.
    pub(crate) fn finish(&self, state: LoopState) {
        *self.core.lifetime_used.lock() = self.carried.saturating_add(self.started.elapsed());
        self.core.set_state(state);
    }

    /// Notify the worker that its lifetime elapsed and end the run.
    pub(crate) fn expire(&self) {
        let core = &self.core;
        core.counters.inc_timeouts();
        core.notify(true);
        core.log.info(&format!(
            "Worker '{}' reached its maximum lifetime after {} cycles",
            core.worker.name(),
            core.counters.cycles()
        ));
        self.finish(LoopState::Expired);
    }

    /// Run one measured cycle starting at `now`.
    ///
    /// `overrun` is whether the wait before this cycle was cut to zero; it
    /// counts as exactly one interval fault even when the measured interval
    /// is within tolerance.
    pub(crate) fn execute(&mut self, now: Instant, overrun: bool) {
        let core = Arc::clone(&self.core);
        self.cadence.begin_cycle(now);
        core.advance_state(LoopState::Executing);

        {
            let mut monitor = core.monitor.lock();
            let faulted = monitor.start_at(now);
            if overrun && !faulted {
                monitor.increment_interval_fault_count();
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| core.worker.run_once()));

        let timed_out = {
            let mut monitor = core.monitor.lock();
            let timed_out = monitor.stop();
            *core.timing.write() = monitor.snapshot();
            timed_out
        };
        core.counters.inc_cycles();

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => core.record_error(&error),
            Err(payload) => core.record_error(&WorkerError::from_panic(payload.as_ref())),
        }

        if timed_out {
            core.counters.inc_timeouts();
            core.log.debug(&format!(
                "Worker '{}' exceeded its expected duration",
                core.worker.name()
            ));
            core.notify(true);
            return;
        }

        self.healthy_cycles = self.healthy_cycles.saturating_add(1);
        if self.healthy_cycles >= core.heartbeat_cycles {
            self.healthy_cycles = 0;
            core.counters.inc_heartbeats();
            core.notify(false);
        }
    }
}
