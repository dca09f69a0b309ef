//! Scheduler and per-worker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cadence::is_reachable;
use crate::error::{SchedulerError, SchedulerResult};
use crate::thread::ThreadPriority;

/// Cycles between two liveness heartbeats delivered to a healthy worker.
pub const DURATION_MSG_INTERVAL: u32 = 60;

/// Default maximum number of attached workers.
pub const DEFAULT_MAX_WORKERS: usize = 64;

/// Default tick of the supervisory loop.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(100);

/// Default interval tolerance, in percent of the interval.
pub const DEFAULT_INTERVAL_DEVIATION_PERCENT: u32 = 10;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of attached entries.
    pub max_workers: usize,
    /// Tick of the supervisory loop.
    pub sync_interval: Duration,
    /// Priority of the supervisory thread.
    pub control_priority: ThreadPriority,
    /// Stack size for entry threads without their own (`None` = platform default).
    pub stack_size: Option<usize>,
    /// Healthy cycles between heartbeats.
    pub heartbeat_cycles: u32,
    /// Interval tolerance applied when a worker does not set its own.
    pub interval_deviation_percent: u32,
    /// Reject attaching a worker instance that is already attached.
    pub reject_duplicate_workers: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            control_priority: ThreadPriority::Normal,
            stack_size: None,
            heartbeat_cycles: DURATION_MSG_INTERVAL,
            interval_deviation_percent: DEFAULT_INTERVAL_DEVIATION_PERCENT,
            reject_duplicate_workers: true,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any parameter is invalid.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_workers == 0 {
            return Err(SchedulerError::invalid_configuration(
                "max_workers must be greater than 0",
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(SchedulerError::invalid_configuration(
                "sync_interval must be greater than 0",
            ));
        }
        if self.heartbeat_cycles == 0 {
            return Err(SchedulerError::invalid_configuration(
                "heartbeat_cycles must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Interval tolerance for `interval` under this configuration.
    #[must_use]
    pub fn interval_deviation_for(&self, interval: Duration) -> Duration {
        percent_of(interval, self.interval_deviation_percent)
    }
}

fn percent_of(value: Duration, percent: u32) -> Duration {
    value.saturating_mul(percent) / 100
}

/// Builder for `SchedulerConfig`.
#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Set the maximum number of workers.
    #[must_use]
    pub fn max_workers(mut self, max: usize) -> Self {
        self.config.max_workers = max;
        self
    }

    /// Set the supervisory tick.
    #[must_use]
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.config.sync_interval = interval;
        self
    }

    /// Set the supervisory thread priority.
    #[must_use]
    pub fn control_priority(mut self, priority: ThreadPriority) -> Self {
        self.config.control_priority = priority;
        self
    }

    /// Set the default stack size of entry threads.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Set the heartbeat period in cycles.
    #[must_use]
    pub fn heartbeat_cycles(mut self, cycles: u32) -> Self {
        self.config.heartbeat_cycles = cycles;
        self
    }

    /// Set the default interval tolerance in percent.
    #[must_use]
    pub fn interval_deviation_percent(mut self, percent: u32) -> Self {
        self.config.interval_deviation_percent = percent;
        self
    }

    /// Allow or reject attaching the same worker twice.
    #[must_use]
    pub fn reject_duplicate_workers(mut self, reject: bool) -> Self {
        self.config.reject_duplicate_workers = reject;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SchedulerResult<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Schedule of one worker.
///
/// Optional fields fall back to the scheduler configuration when the worker
/// is attached, or to crate defaults for standalone loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Priority of the worker thread.
    pub priority: ThreadPriority,
    /// Total running time after which the entry expires (`None` or zero = unbounded).
    pub max_duration: Option<Duration>,
    /// Expected `run_once` duration (`None` = the interval).
    pub expected_duration: Option<Duration>,
    /// Tolerated excess over the expected duration.
    pub duration_deviation: Duration,
    /// Tolerated excess over the interval (`None` = configured percentage).
    pub interval_deviation: Option<Duration>,
    /// Stack size (`None` = configured default).
    pub stack_size: Option<usize>,
    /// Healthy cycles between heartbeats (`None` = configured default).
    pub heartbeat_cycles: Option<u32>,
}

impl WorkerOptions {
    /// Options with the given interval and defaults elsewhere.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            priority: ThreadPriority::Normal,
            max_duration: None,
            expected_duration: None,
            duration_deviation: Duration::ZERO,
            interval_deviation: None,
            stack_size: None,
            heartbeat_cycles: None,
        }
    }

    /// Set the thread priority.
    #[must_use]
    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the maximum lifetime.
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Set the expected cycle duration and its tolerance.
    #[must_use]
    pub fn with_expected_duration(mut self, expected: Duration, deviation: Duration) -> Self {
        self.expected_duration = Some(expected);
        self.duration_deviation = deviation;
        self
    }

    /// Set the interval tolerance.
    #[must_use]
    pub fn with_interval_deviation(mut self, deviation: Duration) -> Self {
        self.interval_deviation = Some(deviation);
        self
    }

    /// Set the thread stack size.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the heartbeat period in cycles.
    #[must_use]
    pub fn with_heartbeat_cycles(mut self, cycles: u32) -> Self {
        self.heartbeat_cycles = Some(cycles);
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero interval or heartbeat period,
    /// or for an interval or lifetime too large to add to the current instant.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.interval.is_zero() {
            return Err(SchedulerError::invalid_configuration(
                "interval must be greater than 0",
            ));
        }
        if !is_reachable(self.interval) {
            return Err(SchedulerError::invalid_configuration(format!(
                "interval {:?} is too large for the monotonic clock",
                self.interval
            )));
        }
        if let Some(lifetime) = self.max_duration.filter(|d| !is_reachable(*d)) {
            return Err(SchedulerError::invalid_configuration(format!(
                "max_duration {lifetime:?} is too large for the monotonic clock"
            )));
        }
        if self.heartbeat_cycles == Some(0) {
            return Err(SchedulerError::invalid_configuration(
                "heartbeat_cycles must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Maximum lifetime, with zero read as unbounded.
    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        self.max_duration.filter(|d| !d.is_zero())
    }

    /// Fill unset fields from `config`.
    #[must_use]
    pub fn resolved(mut self, config: &SchedulerConfig) -> Self {
        if self.expected_duration.is_none() {
            self.expected_duration = Some(self.interval);
        }
        if self.interval_deviation.is_none() {
            self.interval_deviation = Some(config.interval_deviation_for(self.interval));
        }
        if self.stack_size.is_none() {
            self.stack_size = config.stack_size;
        }
        if self.heartbeat_cycles.is_none() {
            self.heartbeat_cycles = Some(config.heartbeat_cycles);
        }
        self
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
