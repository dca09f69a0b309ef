//! Integration tests for the scheduler crate.

use cadence_scheduler::prelude::*;
use cadence_test_helpers::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn quiet_scheduler(config: SchedulerConfig) -> Result<(Scheduler, Arc<CapturingSink>), SchedulerError> {
    let log = Arc::new(LogFacade::new());
    let sink = Arc::new(CapturingSink::new());
    log.register_sink(sink.clone());
    Ok((Scheduler::with_log(config, log)?, sink))
}

fn fast_sync() -> SchedulerConfig {
    SchedulerConfig {
        sync_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[test]
fn test_lifetime_of_550ms_yields_five_cycles() -> TestResult {
    init_tracing();
    let (scheduler, sink) = quiet_scheduler(fast_sync())?;
    let worker = Arc::new(RecordingWorker::new("bounded"));

    let id = scheduler.attach_with_lifetime(
        Arc::clone(&worker),
        ThreadPriority::Normal,
        Duration::from_millis(100),
        Duration::from_millis(550),
    )?;
    scheduler.activate()?;

    assert!(wait_until(Duration::from_secs(3), || worker.timeouts() == 1));
    let runs = worker.runs();
    assert!((4..=6).contains(&runs), "{runs} cycles before expiry");
    assert_eq!(worker.notifications().last(), Some(&true));

    // the supervisor removes the expired entry
    assert!(wait_until(Duration::from_secs(1), || scheduler.worker_count() == 0));
    assert!(scheduler.entry_stats(id).is_err());
    assert!(sink.contains("maximum lifetime"));

    thread::sleep(Duration::from_millis(150));
    assert_eq!(worker.runs(), runs);

    scheduler.deactivate()?;
    Ok(())
}

#[test]
fn test_capacity_error_leaves_attached_set_unchanged() -> TestResult {
    let config = SchedulerConfig::builder().max_workers(3).build()?;
    let (scheduler, _sink) = quiet_scheduler(config)?;

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(scheduler.attach(
            Arc::new(RecordingWorker::new(format!("w{i}"))),
            Duration::from_millis(50),
            ThreadPriority::Normal,
        )?);
    }

    let overflow = Arc::new(RecordingWorker::new("overflow"));
    let result = scheduler.attach(
        Arc::clone(&overflow),
        Duration::from_millis(50),
        ThreadPriority::Normal,
    );

    assert!(matches!(result, Err(SchedulerError::CapacityExceeded { max: 3 })));
    assert_eq!(scheduler.worker_count(), 3);
    assert_eq!(scheduler.entry_ids(), ids);
    assert!(scheduler.stats().iter().all(|s| s.name != "overflow"));

    scheduler.activate()?;
    thread::sleep(Duration::from_millis(120));
    scheduler.deactivate()?;
    assert_eq!(overflow.runs(), 0);
    Ok(())
}

#[test]
fn test_failing_cycles_do_not_stop_the_schedule() -> TestResult {
    let (scheduler, sink) = quiet_scheduler(fast_sync())?;
    let worker = Arc::new(FailingWorker::new("always-fails", 1));

    let id = scheduler.attach(Arc::clone(&worker), Duration::from_millis(5), ThreadPriority::Normal)?;
    scheduler.activate()?;
    assert!(wait_until(Duration::from_secs(2), || worker.runs() >= 5));
    scheduler.deactivate()?;

    let stats = scheduler.entry_stats(id)?;
    assert_eq!(stats.execution_errors, worker.failures());
    assert_eq!(stats.cycles, worker.runs());
    assert!((stats.error_rate() - 1.0).abs() < f64::EPSILON);
    assert!(sink.count_at(LogLevel::Warning) >= 5);
    Ok(())
}

#[test]
fn test_every_other_cycle_fails_counts_exactly() -> TestResult {
    let (scheduler, _sink) = quiet_scheduler(fast_sync())?;
    let worker = Arc::new(FailingWorker::new("alternating", 2));

    let id = scheduler.attach(Arc::clone(&worker), Duration::from_millis(5), ThreadPriority::Normal)?;
    scheduler.activate()?;
    assert!(wait_until(Duration::from_secs(2), || worker.runs() >= 10));
    scheduler.deactivate()?;

    let stats = scheduler.entry_stats(id)?;
    assert_eq!(stats.cycles, worker.runs());
    assert_eq!(stats.execution_errors, worker.runs() / 2);
    Ok(())
}

#[test]
fn test_panics_are_contained() -> TestResult {
    let (scheduler, _sink) = quiet_scheduler(fast_sync())?;
    let panicky = Arc::new(FailingWorker::panicking("panicky", 1));
    let healthy = Arc::new(RecordingWorker::new("healthy"));

    let bad = scheduler.attach(Arc::clone(&panicky), Duration::from_millis(5), ThreadPriority::Normal)?;
    scheduler.attach(Arc::clone(&healthy), Duration::from_millis(5), ThreadPriority::Normal)?;
    scheduler.activate()?;

    assert!(wait_until(Duration::from_secs(2), || {
        panicky.runs() >= 3 && healthy.runs() >= 3
    }));
    scheduler.deactivate()?;

    let stats = scheduler.entry_stats(bad)?;
    assert_eq!(stats.execution_errors, panicky.runs());
    assert_eq!(stats.state, LoopState::Stopped);
    Ok(())
}

#[test]
fn test_drop_blocks_until_run_once_returns() -> TestResult {
    let worker = Arc::new(SlowWorker::new("slow", Duration::from_millis(150)));
    let scheduler = Scheduler::with_log(fast_sync(), Arc::new(LogFacade::new()))?;
    scheduler.attach(Arc::clone(&worker), Duration::from_millis(1), ThreadPriority::Normal)?;
    scheduler.activate()?;

    assert!(wait_until(Duration::from_secs(2), || worker.is_in_run()));
    drop(scheduler);

    // the in-flight cycle completed before drop returned
    assert!(!worker.is_in_run());
    assert!(worker.finished() >= 1);
    assert_eq!(worker.started(), worker.finished());

    let finished = worker.finished();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(worker.finished(), finished);
    Ok(())
}

#[test]
fn test_long_run_cadence_is_accurate() -> TestResult {
    let (scheduler, _sink) = quiet_scheduler(fast_sync())?;
    let worker = Arc::new(RecordingWorker::new("cadence"));

    scheduler.attach(Arc::clone(&worker), Duration::from_millis(20), ThreadPriority::Normal)?;
    scheduler.activate()?;
    thread::sleep(Duration::from_millis(400));
    scheduler.deactivate()?;

    let runs = worker.runs();
    assert!((19..=21).contains(&runs), "{runs} cycles in 400ms at 20ms");
    Ok(())
}

#[test]
fn test_action_agents_with_timeout_callback() -> TestResult {
    let (scheduler, _sink) = quiet_scheduler(fast_sync())?;
    let notifications = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let n = Arc::clone(&notifications);

    scheduler.attach_action_with_timeout(
        "sleepy-agent",
        || thread::sleep(Duration::from_millis(20)),
        Duration::from_millis(10),
        ThreadPriority::Normal,
        move |timeout| n.lock().push(timeout),
    )?;
    assert_eq!(scheduler.agent_count(), 1);

    scheduler.activate()?;
    assert!(wait_until(Duration::from_secs(2), || notifications.lock().len() >= 2));
    scheduler.deactivate()?;

    // every cycle outlasts its 10ms expected duration
    assert!(notifications.lock().iter().all(|timeout| *timeout));
    Ok(())
}

#[test]
fn test_global_log_facade_teardown() {
    let facade = LogFacade::global();
    let sink = Arc::new(CapturingSink::new());
    facade.register_sink(sink.clone());
    facade.info("through the global facade");
    assert!(facade.clear_sink().is_some());
    facade.info("dropped");

    assert!(sink.contains("through the global facade"));
    assert!(!sink.contains("dropped"));
}
