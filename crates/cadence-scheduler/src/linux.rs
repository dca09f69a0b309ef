//! Linux-specific platform implementation.
#![allow(unsafe_code)]

use crate::error::{SchedulerError, SchedulerResult};
use crate::thread::{SchedPolicy, ThreadPriority};
use core::time::Duration;
use libc::{
    CLOCK_MONOTONIC, PRIO_PROCESS, SCHED_FIFO, SCHED_RR, clock_nanosleep, gettid, pthread_self,
    pthread_setschedparam, sched_get_priority_max, sched_get_priority_min, sched_param,
    setpriority, timespec,
};
use std::time::Instant;

/// Nice value for each priority under the time-sharing policy.
fn nice_value(priority: ThreadPriority) -> i32 {
    match priority {
        ThreadPriority::Idle => 19,
        ThreadPriority::Lowest => 10,
        ThreadPriority::BelowNormal => 5,
        ThreadPriority::Normal => 0,
        ThreadPriority::AboveNormal => -5,
        ThreadPriority::Highest => -10,
        ThreadPriority::TimeCritical => -15,
    }
}

/// Scale the abstract level into `[min, max]` of a real-time policy.
fn rt_priority(priority: ThreadPriority, min: i32, max: i32) -> i32 {
    let span = max.saturating_sub(min);
    min.saturating_add(span.saturating_mul(i32::from(priority.level())) / 6)
}

/// Apply priority and policy to the calling thread.
///
/// Raising priority usually needs `CAP_SYS_NICE`; callers treat failure as
/// non-fatal.
pub(crate) fn apply_current_thread_priority(
    priority: ThreadPriority,
    policy: SchedPolicy,
) -> SchedulerResult {
    let native_policy = match policy {
        SchedPolicy::Other => {
            // SAFETY: gettid has no preconditions.
            let tid = unsafe { gettid() };
            let who = u32::try_from(tid).map_err(|_| {
                SchedulerError::priority_setup_failed(format!("invalid thread id {tid}"))
            })?;
            // SAFETY: setpriority only reads its scalar arguments.
            let rc = unsafe { setpriority(PRIO_PROCESS, who, nice_value(priority)) };
            if rc != 0 {
                return Err(SchedulerError::priority_setup_failed(format!(
                    "setpriority: {}",
                    std::io::Error::last_os_error()
                )));
            }
            return Ok(());
        }
        SchedPolicy::Fifo => SCHED_FIFO,
        SchedPolicy::RoundRobin => SCHED_RR,
    };

    // SAFETY: querying policy bounds has no preconditions.
    let min = unsafe { sched_get_priority_min(native_policy) };
    // SAFETY: as above.
    let max = unsafe { sched_get_priority_max(native_policy) };
    if min < 0 || max < min {
        return Err(SchedulerError::priority_setup_failed(
            "policy priority range unavailable",
        ));
    }

    let param = sched_param {
        sched_priority: rt_priority(priority, min, max),
    };
    // SAFETY: pthread_self is the calling thread and `param` outlives the call.
    let rc = unsafe { pthread_setschedparam(pthread_self(), native_policy, &param) };
    if rc != 0 {
        return Err(SchedulerError::priority_setup_failed(format!(
            "pthread_setschedparam: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

/// Linux-specific sleep implementation.
#[derive(Debug)]
pub struct PlatformSleep;

impl PlatformSleep {
    /// Create new platform sleep instance.
    pub fn new() -> Self {
        Self
    }

    /// High-precision sleep with busy-spin tail.
    ///
    /// Uses clock_nanosleep for the bulk of the sleep, then busy-spins
    /// for the final ~80 microseconds.
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
        let ts = timespec {
            tv_sec: libc::time_t::try_from(sleep_duration.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: libc::c_long::try_from(sleep_duration.subsec_nanos()).unwrap_or(0),
        };

        // SAFETY: `ts` is a valid relative timespec and the remainder pointer may be null.
        let result = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &ts, std::ptr::null_mut()) };
        if result != 0 {
            // interrupted; finish with the portable sleep
            let remaining = target
                .saturating_duration_since(Instant::now())
                .saturating_sub(Duration::from_micros(80));
            std::thread::sleep(remaining);
        }

        spin_until(target);
    }
}

fn spin_until(target: Instant) {
    while Instant::now() < target {
        std::hint::spin_loop();
    }
}

impl Default for PlatformSleep {
    fn default() -> Self {
        Self::new()
    }
}
