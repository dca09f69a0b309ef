//! Cross-thread views of entry health.
//!
//! A loop's [`TimeMonitor`](crate::time_monitor::TimeMonitor) belongs to its
//! own thread. Other threads read the copies published here: plain snapshots
//! behind the entry lock plus relaxed atomic counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

/// Timing statistics copied out of a [`TimeMonitor`](crate::time_monitor::TimeMonitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimingSnapshot {
    /// Expected cycle duration.
    pub expected_duration: Duration,
    /// Expected interval between cycle starts.
    pub expected_interval: Duration,
    /// Most recent cycle duration.
    pub current_duration: Duration,
    /// Shortest cycle duration (valid once `first_loop_done`).
    pub min_duration: Duration,
    /// Longest cycle duration (valid once `first_loop_done`).
    pub max_duration: Duration,
    /// Most recent interval between cycle starts.
    pub current_interval: Duration,
    /// Shortest interval between cycle starts.
    pub min_interval: Duration,
    /// Longest interval between cycle starts.
    pub max_interval: Duration,
    /// Cycles whose duration exceeded tolerance.
    pub duration_fault_count: u64,
    /// Late or overrun cycle starts.
    pub interval_fault_count: u64,
    /// Whether min/max values hold at least one sample.
    pub first_loop_done: bool,
}

/// Lifecycle of a worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LoopState {
    /// Constructed, no thread yet.
    Created = 0,
    /// Thread started, first wait not yet entered.
    Scheduled = 1,
    /// Sleeping until the next slot.
    Waiting = 2,
    /// Inside `run_once`.
    Executing = 3,
    /// Stop requested, thread still alive.
    Stopping = 4,
    /// Thread ended after a stop request; may be restarted.
    Stopped = 5,
    /// Thread ended because the maximum lifetime elapsed.
    Expired = 6,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scheduled,
            2 => Self::Waiting,
            3 => Self::Executing,
            4 => Self::Stopping,
            5 => Self::Stopped,
            6 => Self::Expired,
            _ => Self::Created,
        }
    }

    /// Whether the loop thread has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Expired)
    }

    /// Whether the loop thread is alive.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::Waiting | Self::Executing | Self::Stopping
        )
    }
}

/// Atomic cell holding a [`LoopState`].
#[derive(Debug)]
pub(crate) struct AtomicLoopState(AtomicU8);

impl AtomicLoopState {
    pub(crate) const fn new(state: LoopState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `next` unless a stop is pending; terminal states always win.
    pub(crate) fn advance(&self, next: LoopState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != LoopState::Stopping as u8 || next.is_terminal()).then_some(next as u8)
            });
    }

    /// Mark a live loop as stopping. Returns `false` and leaves the state
    /// alone when the loop is not live, so a concurrent expiry is kept.
    pub(crate) fn begin_stop(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                LoopState::from_u8(current)
                    .is_live()
                    .then_some(LoopState::Stopping as u8)
            })
            .is_ok()
    }

    /// Settle a pending stop as `Stopped`; any other state is kept.
    pub(crate) fn finish_stop(&self) -> bool {
        self.0
            .compare_exchange(
                LoopState::Stopping as u8,
                LoopState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Counters updated by a loop thread on every cycle.
#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    cycles: AtomicU64,
    execution_errors: AtomicU64,
    heartbeats: AtomicU64,
    timeouts: AtomicU64,
}

impl LoopCounters {
    pub(crate) fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_execution_errors(&self) -> u64 {
        self.execution_errors
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    pub(crate) fn inc_heartbeats(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub(crate) fn execution_errors(&self) -> u64 {
        self.execution_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    pub(crate) fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

/// Point-in-time health of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    /// Entry id assigned at attach time (0 for standalone loops).
    pub id: u64,
    /// Worker name.
    pub name: String,
    /// Loop state.
    pub state: LoopState,
    /// Completed `run_once` invocations, failed ones included.
    pub cycles: u64,
    /// Cycles whose `run_once` returned an error or panicked.
    pub execution_errors: u64,
    /// `notify_duration_timeout(false)` heartbeats delivered.
    pub heartbeats: u64,
    /// `notify_duration_timeout(true)` notifications delivered.
    pub timeouts: u64,
    /// Timing statistics as of the last completed cycle.
    pub timing: TimingSnapshot,
}

impl EntryStats {
    /// Fraction of cycles that failed, 0.0 when nothing ran yet.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.execution_errors as f64 / self.cycles as f64
        }
    }
}
