//! Windows-specific platform implementation.
#![allow(unsafe_code)]

use crate::error::{SchedulerError, SchedulerResult};
use crate::thread::{SchedPolicy, ThreadPriority};
use std::time::{Duration, Instant};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Threading::{
    CreateWaitableTimerW, GetCurrentThread, INFINITE, SetThreadPriority, SetWaitableTimer,
    THREAD_PRIORITY, THREAD_PRIORITY_ABOVE_NORMAL, THREAD_PRIORITY_BELOW_NORMAL,
    THREAD_PRIORITY_HIGHEST, THREAD_PRIORITY_IDLE, THREAD_PRIORITY_LOWEST, THREAD_PRIORITY_NORMAL,
    THREAD_PRIORITY_TIME_CRITICAL, WaitForSingleObject,
};

fn native_priority(priority: ThreadPriority) -> THREAD_PRIORITY {
    match priority {
        ThreadPriority::Idle => THREAD_PRIORITY_IDLE,
        ThreadPriority::Lowest => THREAD_PRIORITY_LOWEST,
        ThreadPriority::BelowNormal => THREAD_PRIORITY_BELOW_NORMAL,
        ThreadPriority::Normal => THREAD_PRIORITY_NORMAL,
        ThreadPriority::AboveNormal => THREAD_PRIORITY_ABOVE_NORMAL,
        ThreadPriority::Highest => THREAD_PRIORITY_HIGHEST,
        ThreadPriority::TimeCritical => THREAD_PRIORITY_TIME_CRITICAL,
    }
}

/// Apply priority to the calling thread. Windows has no per-thread policy,
/// so `_policy` is ignored.
pub(crate) fn apply_current_thread_priority(
    priority: ThreadPriority,
    _policy: SchedPolicy,
) -> SchedulerResult {
    // SAFETY: GetCurrentThread returns a pseudo handle valid for the calling thread.
    unsafe {
        SetThreadPriority(GetCurrentThread(), native_priority(priority))
            .map_err(|e| SchedulerError::priority_setup_failed(e.to_string()))
    }
}

/// Windows-specific sleep implementation.
#[derive(Debug)]
pub struct PlatformSleep {
    timer_handle: Option<HANDLE>,
}

// SAFETY: waitable timer handles are not tied to the creating thread, and the
// handle is only used through `&mut self`.
unsafe impl Send for PlatformSleep {}

impl PlatformSleep {
    /// Create new platform sleep instance.
    pub fn new() -> Self {
        Self { timer_handle: None }
    }

    /// High-precision sleep with busy-spin tail.
    ///
    /// Uses a waitable timer for the bulk of the sleep, then busy-spins
    /// for the final ~80 microseconds. Falls back to `thread::sleep` if the
    /// timer cannot be created.
    pub fn sleep_until(&mut self, target: Instant) {
        let now = Instant::now();
        if target <= now {
            return;
        }

        let duration = target.duration_since(now);

        if duration.as_micros() < 100 {
            spin_until(target);
            return;
        }

        let sleep_duration = duration.saturating_sub(Duration::from_micros(80));
        let waited = self.get_or_create_timer().is_some_and(|timer| {
            let due_time = relative_due_time_100ns(sleep_duration);
            // SAFETY: `timer` is a live waitable timer owned by this struct.
            let armed = unsafe { SetWaitableTimer(timer, &due_time, 0, None, None, false) };
            if armed.is_err() {
                return false;
            }
            // SAFETY: as above.
            let _event = unsafe { WaitForSingleObject(timer, INFINITE) };
            true
        });

        if !waited {
            std::thread::sleep(sleep_duration);
        }

        spin_until(target);
    }

    fn get_or_create_timer(&mut self) -> Option<HANDLE> {
        if let Some(handle) = self.timer_handle {
            return Some(handle);
        }

        // SAFETY: no security attributes or name are passed.
        let timer = unsafe { CreateWaitableTimerW(None, true, None) }.ok()?;
        self.timer_handle = Some(timer);
        Some(timer)
    }
}

fn spin_until(target: Instant) {
    while Instant::now() < target {
        std::hint::spin_loop();
    }
}

impl Drop for PlatformSleep {
    fn drop(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            // SAFETY: the handle was created by CreateWaitableTimerW and is closed once.
            unsafe {
                let _ = CloseHandle(handle);
            }
        }
    }
}

/// Convert duration to relative due time in 100ns units for waitable timer.
fn relative_due_time_100ns(duration: Duration) -> i64 {
    let ticks_100ns = (duration.as_nanos() / 100).min(i64::MAX as u128) as i64;
    -ticks_100ns.max(1)
}

impl Default for PlatformSleep {
    fn default() -> Self {
        Self::new()
    }
}
