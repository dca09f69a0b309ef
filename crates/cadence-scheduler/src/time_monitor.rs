//! Per-cycle duration and interval monitoring.
//!
//! [`TimeMonitor`] turns raw monotonic timestamps into statistics and fault
//! counts. It is a plain value with no interior synchronization; the loop that
//! owns it is the only writer.

use std::time::{Duration, Instant};

use crate::stats::TimingSnapshot;

/// Duration and interval statistics for one periodic routine.
///
/// A cycle is bracketed by [`start`](Self::start) and [`stop`](Self::stop).
/// Starting a cycle also observes the interval since the previous start.
///
/// Minimum and maximum values are only meaningful once
/// [`is_first_loop_done`](Self::is_first_loop_done) returns `true`; before
/// that they read as zero.
///
/// A sample is a fault when it exceeds the expected value plus its
/// deviation. Cycles that start early (the catch-up slot after an overrun)
/// are not interval faults.
#[derive(Debug, Clone)]
pub struct TimeMonitor {
    expected_duration: Duration,
    expected_interval: Duration,
    duration_deviation: Duration,
    interval_deviation: Duration,

    duration_cur: Duration,
    duration_min: Duration,
    duration_max: Duration,
    interval_cur: Duration,
    interval_min: Duration,
    interval_max: Duration,

    duration_fault_count: u64,
    interval_fault_count: u64,

    cycle_start: Option<Instant>,
    interval_samples: u64,
    first_loop_done: bool,
    last_cycle_timed_out: bool,
}

impl TimeMonitor {
    /// Create a monitor with zero tolerance on both fields.
    #[must_use]
    pub fn new(expected_duration: Duration, expected_interval: Duration) -> Self {
        Self {
            expected_duration,
            expected_interval,
            duration_deviation: Duration::ZERO,
            interval_deviation: Duration::ZERO,
            duration_cur: Duration::ZERO,
            duration_min: Duration::ZERO,
            duration_max: Duration::ZERO,
            interval_cur: Duration::ZERO,
            interval_min: Duration::ZERO,
            interval_max: Duration::ZERO,
            duration_fault_count: 0,
            interval_fault_count: 0,
            cycle_start: None,
            interval_samples: 0,
            first_loop_done: false,
            last_cycle_timed_out: false,
        }
    }

    /// Set the tolerated deviation for duration and interval samples.
    #[must_use]
    pub fn with_deviation(mut self, duration_deviation: Duration, interval_deviation: Duration) -> Self {
        self.duration_deviation = duration_deviation;
        self.interval_deviation = interval_deviation;
        self
    }

    /// Mark the start of a cycle now.
    ///
    /// Returns `true` if the interval since the previous start was a fault.
    pub fn start(&mut self) -> bool {
        self.start_at(Instant::now())
    }

    /// Mark the start of a cycle at `now`.
    ///
    /// Returns `true` if the interval since the previous start was a fault.
    pub fn start_at(&mut self, now: Instant) -> bool {
        let faulted = self.interval_observed(now);
        self.cycle_start = Some(now);
        faulted
    }

    /// Mark the end of the current cycle now.
    ///
    /// Returns `true` if the cycle was a duration timeout.
    pub fn stop(&mut self) -> bool {
        self.stop_at(Instant::now())
    }

    /// Mark the end of the current cycle at `now`.
    ///
    /// Returns `true` if the cycle was a duration timeout. Calling this
    /// without a preceding start is a no-op that returns `false`.
    pub fn stop_at(&mut self, now: Instant) -> bool {
        let Some(started) = self.cycle_start else {
            return false;
        };

        let duration = now.saturating_duration_since(started);
        self.duration_cur = duration;
        if self.first_loop_done {
            self.duration_min = self.duration_min.min(duration);
            self.duration_max = self.duration_max.max(duration);
        } else {
            self.duration_min = duration;
            self.duration_max = duration;
            self.first_loop_done = true;
        }

        self.last_cycle_timed_out = self.is_duration_timeout();
        if self.last_cycle_timed_out {
            self.duration_fault_count = self.duration_fault_count.saturating_add(1);
        }
        self.last_cycle_timed_out
    }

    /// Observe the interval between the previous cycle start and `now`.
    ///
    /// Returns `true` and increments the interval fault count if the interval
    /// exceeds the expected interval plus its deviation. Returns `false`
    /// without recording anything when no previous start exists.
    pub fn interval_observed(&mut self, now: Instant) -> bool {
        let Some(previous) = self.cycle_start else {
            return false;
        };

        let interval = now.saturating_duration_since(previous);
        self.interval_cur = interval;
        if self.interval_samples == 0 {
            self.interval_min = interval;
            self.interval_max = interval;
        } else {
            self.interval_min = self.interval_min.min(interval);
            self.interval_max = self.interval_max.max(interval);
        }
        self.interval_samples = self.interval_samples.saturating_add(1);

        let faulted = self.is_interval_timeout();
        if faulted {
            self.increment_interval_fault_count();
        }
        faulted
    }

    /// Count an interval fault detected outside the monitor.
    pub fn increment_interval_fault_count(&mut self) {
        self.interval_fault_count = self.interval_fault_count.saturating_add(1);
    }

    /// Clear duration statistics so the next cycle starts a fresh sample set.
    ///
    /// With `clear_faults` the duration fault count is zeroed as well.
    pub fn reset_elapsed_timing(&mut self, clear_faults: bool) {
        self.duration_cur = Duration::ZERO;
        self.duration_min = Duration::ZERO;
        self.duration_max = Duration::ZERO;
        self.first_loop_done = false;
        self.last_cycle_timed_out = false;
        if clear_faults {
            self.duration_fault_count = 0;
        }
    }

    /// Forget the previous cycle start so the next start is not measured
    /// against it, and clear interval statistics.
    ///
    /// With `clear_faults` the interval fault count is zeroed as well.
    pub fn reset_interval_timing(&mut self, clear_faults: bool) {
        self.cycle_start = None;
        self.interval_cur = Duration::ZERO;
        self.interval_min = Duration::ZERO;
        self.interval_max = Duration::ZERO;
        self.interval_samples = 0;
        if clear_faults {
            self.interval_fault_count = 0;
        }
    }

    fn is_duration_timeout(&self) -> bool {
        self.duration_cur > self.expected_duration.saturating_add(self.duration_deviation)
    }

    fn is_interval_timeout(&self) -> bool {
        self.interval_cur > self.expected_interval.saturating_add(self.interval_deviation)
    }

    /// Longest observed cycle duration.
    #[inline]
    pub fn max_duration(&self) -> Duration {
        self.duration_max
    }

    /// Shortest observed cycle duration.
    #[inline]
    pub fn min_duration(&self) -> Duration {
        self.duration_min
    }

    /// Duration of the most recent cycle.
    #[inline]
    pub fn current_duration(&self) -> Duration {
        self.duration_cur
    }

    /// Longest observed interval between cycle starts.
    #[inline]
    pub fn max_interval(&self) -> Duration {
        self.interval_max
    }

    /// Shortest observed interval between cycle starts.
    #[inline]
    pub fn min_interval(&self) -> Duration {
        self.interval_min
    }

    /// Most recent interval between cycle starts.
    #[inline]
    pub fn current_interval(&self) -> Duration {
        self.interval_cur
    }

    /// Number of cycles whose duration exceeded tolerance.
    #[inline]
    pub fn duration_fault_count(&self) -> u64 {
        self.duration_fault_count
    }

    /// Number of interval faults.
    #[inline]
    pub fn interval_fault_count(&self) -> u64 {
        self.interval_fault_count
    }

    /// Whether at least one full cycle has been measured.
    #[inline]
    pub fn is_first_loop_done(&self) -> bool {
        self.first_loop_done
    }

    /// Whether the most recent cycle was a duration timeout.
    #[inline]
    pub fn last_cycle_timed_out(&self) -> bool {
        self.last_cycle_timed_out
    }

    /// Expected cycle duration.
    #[inline]
    pub fn expected_duration(&self) -> Duration {
        self.expected_duration
    }

    /// Expected interval between cycle starts.
    #[inline]
    pub fn expected_interval(&self) -> Duration {
        self.expected_interval
    }

    /// Copy the statistics into a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            expected_duration: self.expected_duration,
            expected_interval: self.expected_interval,
            current_duration: self.duration_cur,
            min_duration: self.duration_min,
            max_duration: self.duration_max,
            current_interval: self.interval_cur,
            min_interval: self.interval_min,
            max_interval: self.interval_max,
            duration_fault_count: self.duration_fault_count,
            interval_fault_count: self.interval_fault_count,
            first_loop_done: self.first_loop_done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_monitor_creation() {
        let monitor = TimeMonitor::new(ms(10), ms(100));
        assert_eq!(monitor.expected_duration(), ms(10));
        assert_eq!(monitor.expected_interval(), ms(100));
        assert!(!monitor.is_first_loop_done());
        assert_eq!(monitor.duration_fault_count(), 0);
        assert_eq!(monitor.interval_fault_count(), 0);
    }

    #[test]
    fn test_duration_tracking() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        let t0 = Instant::now();

        monitor.start_at(t0);
        assert!(!monitor.stop_at(t0 + ms(4)));
        assert!(monitor.is_first_loop_done());

        monitor.start_at(t0 + ms(100));
        assert!(!monitor.stop_at(t0 + ms(108)));

        assert_eq!(monitor.current_duration(), ms(8));
        assert_eq!(monitor.min_duration(), ms(4));
        assert_eq!(monitor.max_duration(), ms(8));
    }

    #[test]
    fn test_duration_timeout_respects_deviation() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100)).with_deviation(ms(2), Duration::ZERO);
        let t0 = Instant::now();

        monitor.start_at(t0);
        assert!(!monitor.stop_at(t0 + ms(12)));
        assert_eq!(monitor.duration_fault_count(), 0);

        monitor.start_at(t0 + ms(100));
        assert!(monitor.stop_at(t0 + ms(113)));
        assert!(monitor.last_cycle_timed_out());
        assert_eq!(monitor.duration_fault_count(), 1);
    }

    #[test]
    fn test_interval_fault_only_when_late() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100)).with_deviation(Duration::ZERO, ms(5));
        let t0 = Instant::now();

        assert!(!monitor.start_at(t0));
        monitor.stop_at(t0 + ms(1));

        assert!(!monitor.start_at(t0 + ms(104)));
        monitor.stop_at(t0 + ms(105));

        // early catch-up start is not a fault
        assert!(!monitor.start_at(t0 + ms(150)));
        monitor.stop_at(t0 + ms(151));

        assert!(monitor.start_at(t0 + ms(260)));
        assert_eq!(monitor.interval_fault_count(), 1);
        assert_eq!(monitor.min_interval(), ms(46));
        assert_eq!(monitor.max_interval(), ms(110));
        assert_eq!(monitor.current_interval(), ms(110));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        assert!(!monitor.stop());
        assert!(!monitor.is_first_loop_done());
    }

    #[test]
    fn test_increment_interval_fault_count() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        monitor.increment_interval_fault_count();
        monitor.increment_interval_fault_count();
        assert_eq!(monitor.interval_fault_count(), 2);
    }

    #[test]
    fn test_reset_interval_timing_rebaselines() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        let t0 = Instant::now();

        monitor.start_at(t0);
        monitor.stop_at(t0 + ms(1));
        monitor.start_at(t0 + ms(300));
        assert_eq!(monitor.interval_fault_count(), 1);

        monitor.reset_interval_timing(false);
        // a long pause after the reset is not measured
        assert!(!monitor.start_at(t0 + ms(5_000)));
        assert_eq!(monitor.interval_fault_count(), 1);
        assert_eq!(monitor.current_interval(), Duration::ZERO);

        monitor.reset_interval_timing(true);
        assert_eq!(monitor.interval_fault_count(), 0);
    }

    #[test]
    fn test_reset_elapsed_timing() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        let t0 = Instant::now();

        monitor.start_at(t0);
        monitor.stop_at(t0 + ms(50));
        assert_eq!(monitor.duration_fault_count(), 1);

        monitor.reset_elapsed_timing(false);
        assert!(!monitor.is_first_loop_done());
        assert_eq!(monitor.max_duration(), Duration::ZERO);
        assert_eq!(monitor.duration_fault_count(), 1);

        monitor.reset_elapsed_timing(true);
        assert_eq!(monitor.duration_fault_count(), 0);
    }

    #[test]
    fn test_snapshot_mirrors_accessors() {
        let mut monitor = TimeMonitor::new(ms(10), ms(100));
        let t0 = Instant::now();
        monitor.start_at(t0);
        monitor.stop_at(t0 + ms(3));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.current_duration, ms(3));
        assert_eq!(snapshot.expected_interval, ms(100));
        assert!(snapshot.first_loop_done);
    }
}
