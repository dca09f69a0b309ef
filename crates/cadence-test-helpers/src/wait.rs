//! Polling helpers for assertions on background threads.

use std::thread;
use std::time::{Duration, Instant};

/// Poll `predicate` every millisecond until it holds or `timeout` elapses.
///
/// Returns whether the predicate held.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Install a test-writer `tracing` subscriber once per process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("cadence=debug,cadence_scheduler=debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}
