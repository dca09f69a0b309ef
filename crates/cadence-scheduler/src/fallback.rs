//! Fallback platform implementation for non-Windows, non-Linux systems.

use crate::error::SchedulerResult;
use crate::thread::{SchedPolicy, ThreadPriority};
use std::time::Instant;

/// Priority is left at the platform default.
pub(crate) fn apply_current_thread_priority(
    _priority: ThreadPriority,
    _policy: SchedPolicy,
) -> SchedulerResult {
    Ok(())
}

/// Fallback sleep implementation using standard library.
#[derive(Debug)]
pub struct PlatformSleep;

impl PlatformSleep {
    /// Create new platform sleep instance.
    pub fn new() -> Self {
        Self
    }

    /// Fallback sleep using standard thread::sleep.
    pub fn sleep_until(&mut self, target: Instant) {
        let now = Instant::now();
        if target > now {
            std::thread::sleep(target - now);
        }
    }
}

impl Default for PlatformSleep {
    fn default() -> Self {
        Self::new()
    }
}
