//! Fixed-cadence slot arithmetic shared by the worker loops.
//!
//! Slots are anchored to the instant the loop started: slot `n` is due at
//! `anchor + n * interval`. A slow cycle makes the following slot run
//! immediately, but it does not move later slots, so long-run cadence stays
//! accurate. When a cycle overruns by more than one whole interval the
//! missed slots are skipped instead of being replayed back to back.

use std::time::{Duration, Instant};

/// `base + offset`, clamped to the latest instant the platform can represent.
pub(crate) fn instant_after(base: Instant, offset: Duration) -> Instant {
    let mut offset = offset;
    loop {
        if let Some(instant) = base.checked_add(offset) {
            return instant;
        }
        offset /= 2;
    }
}

/// Whether `offset` can be added to the current instant without overflow.
pub(crate) fn is_reachable(offset: Duration) -> bool {
    Instant::now().checked_add(offset.saturating_mul(2)).is_some()
}

/// Drift-corrected schedule of cycle start times.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    next_slot: Instant,
    slots_begun: u64,
    slots_skipped: u64,
}

impl Cadence {
    /// Create a cadence whose first slot is due one interval after `anchor`.
    ///
    /// A zero interval is treated as one nanosecond.
    #[must_use]
    pub fn new(interval: Duration, anchor: Instant) -> Self {
        let interval = interval.max(Duration::from_nanos(1));
        Self {
            interval,
            next_slot: instant_after(anchor, interval),
            slots_begun: 0,
            slots_skipped: 0,
        }
    }

    /// Time left until the next slot, zero when it is already due.
    #[must_use]
    pub fn required_wait(&self, now: Instant) -> Duration {
        self.next_slot.saturating_duration_since(now)
    }

    /// Whether `now` is strictly past the next slot, i.e. the previous cycle
    /// overran its slot.
    #[must_use]
    pub fn is_overrun(&self, now: Instant) -> bool {
        now > self.next_slot
    }

    /// Instant at which the next slot is due.
    #[inline]
    #[must_use]
    pub fn next_slot(&self) -> Instant {
        self.next_slot
    }

    /// Consume the due slot and schedule the following one.
    ///
    /// Returns the number of whole slots skipped because `now` is already
    /// past them.
    pub fn begin_cycle(&mut self, now: Instant) -> u64 {
        self.slots_begun = self.slots_begun.saturating_add(1);
        self.next_slot = instant_after(self.next_slot, self.interval);

        if self.next_slot > now {
            return 0;
        }

        let behind = now.duration_since(self.next_slot).as_nanos();
        let missed = behind / self.interval.as_nanos() + 1;
        let missed = u64::try_from(missed).unwrap_or(u64::MAX);
        let skip = self.interval.saturating_mul(u32::try_from(missed).unwrap_or(u32::MAX));
        self.next_slot = instant_after(self.next_slot, skip);
        self.slots_skipped = self.slots_skipped.saturating_add(missed);
        missed
    }

    /// Re-anchor the schedule at `anchor`, as after a pause.
    pub fn rebase(&mut self, anchor: Instant) {
        self.next_slot = instant_after(anchor, self.interval);
    }

    /// Slot length.
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of slots consumed by [`begin_cycle`](Self::begin_cycle).
    #[inline]
    #[must_use]
    pub fn slots_begun(&self) -> u64 {
        self.slots_begun
    }

    /// Number of slots skipped after long overruns.
    #[inline]
    #[must_use]
    pub fn slots_skipped(&self) -> u64 {
        self.slots_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_slot_one_interval_after_anchor() {
        let t0 = Instant::now();
        let cadence = Cadence::new(ms(100), t0);
        assert_eq!(cadence.next_slot(), t0 + ms(100));
        assert_eq!(cadence.required_wait(t0), ms(100));
        assert_eq!(cadence.required_wait(t0 + ms(30)), ms(70));
    }

    #[test]
    fn test_slow_cycle_does_not_shift_phase() {
        let t0 = Instant::now();
        let mut cadence = Cadence::new(ms(100), t0);

        // slot at 100 runs for 150
        assert_eq!(cadence.begin_cycle(t0 + ms(100)), 0);
        let end = t0 + ms(250);
        assert!(cadence.is_overrun(end));
        assert_eq!(cadence.required_wait(end), Duration::ZERO);

        // catch-up run immediately, next slot stays on the grid
        assert_eq!(cadence.begin_cycle(end), 0);
        assert_eq!(cadence.next_slot(), t0 + ms(300));
        assert!(!cadence.is_overrun(end + ms(1)));
        assert_eq!(cadence.required_wait(end + ms(1)), ms(49));
    }

    #[test]
    fn test_long_overrun_skips_missed_slots() {
        let t0 = Instant::now();
        let mut cadence = Cadence::new(ms(100), t0);

        cadence.begin_cycle(t0 + ms(100));
        // ran until 450: slots at 200, 300, 400 were missed
        let end = t0 + ms(450);
        assert!(cadence.is_overrun(end));
        let skipped = cadence.begin_cycle(end);
        assert_eq!(skipped, 2);
        assert_eq!(cadence.next_slot(), t0 + ms(500));
        assert_eq!(cadence.slots_skipped(), 2);
        assert_eq!(cadence.slots_begun(), 2);
    }

    #[test]
    fn test_rebase() {
        let t0 = Instant::now();
        let mut cadence = Cadence::new(ms(10), t0);
        cadence.rebase(t0 + ms(1_000));
        assert_eq!(cadence.next_slot(), t0 + ms(1_010));
    }

    #[test]
    fn test_unrepresentable_interval_clamps_instead_of_panicking() {
        let t0 = Instant::now();
        let mut cadence = Cadence::new(Duration::MAX, t0);
        assert!(cadence.next_slot() > t0);
        assert_eq!(cadence.begin_cycle(t0), 0);
        cadence.rebase(t0);
        assert!(cadence.required_wait(t0) > Duration::from_secs(3_600));
    }

    #[test]
    fn test_reachable_offsets() {
        assert!(is_reachable(ms(10)));
        assert!(is_reachable(Duration::from_secs(86_400 * 365)));
        assert!(!is_reachable(Duration::MAX));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let t0 = Instant::now();
        let cadence = Cadence::new(Duration::ZERO, t0);
        assert_eq!(cadence.interval(), Duration::from_nanos(1));
    }
}
