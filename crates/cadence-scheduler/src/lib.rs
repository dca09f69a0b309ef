//! Periodic worker execution on dedicated threads.
//!
//! Each attached worker runs on its own OS thread at a fixed cadence, with
//! drift correction, execution-duration monitoring and cooperative
//! cancellation. It includes:
//!
//! - **Scheduler**: owns a set of worker loops plus a supervisory thread,
//!   with attach/activate/deactivate and a capacity limit
//! - **CyclicWorkerLoop**: one worker on one thread, stoppable at any wait
//! - **CriticalWorkerLoop**: a loop whose wait and run are never cut short
//! - **TimeMonitor**: duration and interval statistics with fault counts
//! - **ThreadHandle**: named, prioritised threads driven by a `Runnable`
//! - **LogFacade**: forwards diagnostics to `tracing` and one optional sink
//!
//! # Timing model
//!
//! Cycle `n` of an entry is due at `start + n * interval`. A cycle that
//! overruns its slot makes the next one start immediately and counts one
//! interval fault; later slots keep their original phase. The engine never
//! preempts `run_once`: overruns are detected after the fact and reported
//! through [`ScheduledWorker::notify_duration_timeout`].
//!
//! # Example
//!
//! ```
//! use cadence_scheduler::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! struct Poller {
//!     polls: AtomicU32,
//! }
//!
//! impl ScheduledWorker for Poller {
//!     fn run_once(&self) -> WorkerResult {
//!         self.polls.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//!
//!     fn worker_name(&self) -> &str {
//!         "poller"
//!     }
//! }
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let poller = Arc::new(Poller { polls: AtomicU32::new(0) });
//! scheduler.attach(Arc::clone(&poller), Duration::from_millis(5), ThreadPriority::Normal)?;
//!
//! scheduler.activate()?;
//! std::thread::sleep(Duration::from_millis(30));
//! scheduler.deactivate()?;
//!
//! assert!(poller.polls.load(Ordering::Relaxed) > 0);
//! # Ok::<(), SchedulerError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod cadence;
pub mod config;
pub mod critical;
mod cycle;
pub mod cyclic;
pub mod error;
pub mod log;
pub mod scheduler;
pub mod stats;
pub mod thread;
pub mod time_monitor;
pub mod worker;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod fallback;

pub mod prelude;

pub use cadence::Cadence;
pub use config::{
    DEFAULT_INTERVAL_DEVIATION_PERCENT, DEFAULT_MAX_WORKERS, DEFAULT_SYNC_INTERVAL,
    DURATION_MSG_INTERVAL, SchedulerConfig, SchedulerConfigBuilder, WorkerOptions,
};
pub use critical::CriticalWorkerLoop;
pub use cyclic::{CyclicWorkerLoop, EntryId};
pub use error::{SchedulerError, SchedulerResult, WorkerError, WorkerResult};
pub use log::{LogFacade, LogLevel, LogSink};
pub use scheduler::Scheduler;
pub use stats::{EntryStats, LoopState, TimingSnapshot};
pub use thread::{
    Runnable, SchedPolicy, ThreadHandle, ThreadPriority, ThreadSpec, current_thread_name,
};
pub use time_monitor::TimeMonitor;
pub use worker::{ActionWorker, ScheduledWorker, TimeoutCallback, WorkerKind};
