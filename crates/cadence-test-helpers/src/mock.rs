//! Mock workers for scheduler tests.
//!
//! Every mock records what the loop did to it so tests can assert on cycle
//! counts, notification order and timing without sleeping inside assertions.

use cadence_scheduler::{ScheduledWorker, WorkerError, WorkerResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Counts runs and records every notification.
#[derive(Debug)]
pub struct RecordingWorker {
    name: String,
    runs: AtomicU64,
    run_starts: Mutex<Vec<Instant>>,
    notifications: Mutex<Vec<bool>>,
}

impl RecordingWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs: AtomicU64::new(0),
            run_starts: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn run_starts(&self) -> Vec<Instant> {
        self.run_starts.lock().clone()
    }

    /// Notifications in delivery order.
    pub fn notifications(&self) -> Vec<bool> {
        self.notifications.lock().clone()
    }

    pub fn timeouts(&self) -> usize {
        self.notifications.lock().iter().filter(|t| **t).count()
    }

    pub fn heartbeats(&self) -> usize {
        self.notifications.lock().iter().filter(|t| !**t).count()
    }
}

impl ScheduledWorker for RecordingWorker {
    fn run_once(&self) -> WorkerResult {
        self.run_starts.lock().push(Instant::now());
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn worker_name(&self) -> &str {
        &self.name
    }

    fn notify_duration_timeout(&self, is_timeout: bool) {
        self.notifications.lock().push(is_timeout);
    }
}

/// Sleeps inside every `run_once` and exposes whether a run is in flight.
#[derive(Debug)]
pub struct SlowWorker {
    name: String,
    delay: Duration,
    in_run: AtomicBool,
    started: AtomicU64,
    finished: AtomicU64,
}

impl SlowWorker {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            in_run: AtomicBool::new(false),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        }
    }

    pub fn is_in_run(&self) -> bool {
        self.in_run.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ScheduledWorker for SlowWorker {
    fn run_once(&self) -> WorkerResult {
        self.in_run.store(true, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.in_run.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn worker_name(&self) -> &str {
        &self.name
    }
}

/// Fails (or panics) on every `every`-th cycle.
#[derive(Debug)]
pub struct FailingWorker {
    name: String,
    every: u64,
    panics: bool,
    runs: AtomicU64,
    failures: AtomicU64,
}

impl FailingWorker {
    /// Return an error on cycles `every`, `2 * every`, ...
    pub fn new(name: impl Into<String>, every: u64) -> Self {
        Self {
            name: name.into(),
            every: every.max(1),
            panics: false,
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Panic instead of returning an error.
    pub fn panicking(name: impl Into<String>, every: u64) -> Self {
        Self {
            panics: true,
            ..Self::new(name, every)
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl ScheduledWorker for FailingWorker {
    fn run_once(&self) -> WorkerResult {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if run % self.every != 0 {
            return Ok(());
        }
        self.failures.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("scripted panic on cycle {run}");
        }
        Err(WorkerError::failed(format!("scripted failure on cycle {run}")))
    }

    fn worker_name(&self) -> &str {
        &self.name
    }
}

/// Runs for a scripted duration per cycle; cycles past the script are instant.
#[derive(Debug)]
pub struct ScriptedWorker {
    name: String,
    script: Vec<Duration>,
    runs: AtomicU64,
    run_starts: Mutex<Vec<Instant>>,
    notifications: Mutex<Vec<bool>>,
}

impl ScriptedWorker {
    pub fn new(name: impl Into<String>, script: Vec<Duration>) -> Self {
        Self {
            name: name.into(),
            script,
            runs: AtomicU64::new(0),
            run_starts: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Instant cycles except cycle `cycle` (1-based), which takes `duration`.
    pub fn overrun_once(name: impl Into<String>, cycle: usize, duration: Duration) -> Self {
        let mut script = vec![Duration::ZERO; cycle.max(1)];
        script[cycle.max(1) - 1] = duration;
        Self::new(name, script)
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn run_starts(&self) -> Vec<Instant> {
        self.run_starts.lock().clone()
    }

    pub fn notifications(&self) -> Vec<bool> {
        self.notifications.lock().clone()
    }
}

impl ScheduledWorker for ScriptedWorker {
    fn run_once(&self) -> WorkerResult {
        self.run_starts.lock().push(Instant::now());
        let index = self.runs.fetch_add(1, Ordering::SeqCst);
        let delay = usize::try_from(index)
            .ok()
            .and_then(|i| self.script.get(i))
            .copied()
            .unwrap_or_default();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn worker_name(&self) -> &str {
        &self.name
    }

    fn notify_duration_timeout(&self, is_timeout: bool) {
        self.notifications.lock().push(is_timeout);
    }
}
