//! Prelude module for common scheduler types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the scheduler crate.

pub use crate::config::{DURATION_MSG_INTERVAL, SchedulerConfig, WorkerOptions};
pub use crate::critical::CriticalWorkerLoop;
pub use crate::cyclic::{CyclicWorkerLoop, EntryId};
pub use crate::error::{SchedulerError, SchedulerResult, WorkerError, WorkerResult};
pub use crate::log::{LogFacade, LogLevel, LogSink};
pub use crate::scheduler::Scheduler;
pub use crate::stats::{EntryStats, LoopState, TimingSnapshot};
pub use crate::thread::{ThreadPriority, SchedPolicy};
pub use crate::time_monitor::TimeMonitor;
pub use crate::worker::{ActionWorker, ScheduledWorker, WorkerKind};
