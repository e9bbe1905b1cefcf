//! Integration tests for the taskpool scheduler
//!
//! These tests drive the public submit/shutdown surface end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use taskpool::{CompletionLatch, Priority, Scheduler, SchedulerConfig, SchedulerError, TaskHandle};

const WAIT: Duration = Duration::from_secs(10);

fn scheduler(worker_count: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig {
        worker_count,
        poll_interval_ms: 50,
    })
    .expect("Failed to start scheduler")
}

/// Occupy one worker until the returned sender is used
fn block_worker(scheduler: &Scheduler) -> mpsc::Sender<()> {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    scheduler
        .submit(
            move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            },
            Priority::High,
            0,
        )
        .unwrap();
    started_rx.recv_timeout(WAIT).expect("Blocker never started");
    release_tx
}

fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl FnOnce() + Send + use<> {
    let log = Arc::clone(log);
    move || log.lock().unwrap().push(label)
}

fn finish(scheduler: &Scheduler) {
    scheduler.shutdown();
    scheduler.await_termination().expect("Failed to await termination");
}

// =============================================================================
// Timing
// =============================================================================

#[test]
fn test_immediate_task_starts_after_submission() {
    let scheduler = scheduler(2);
    let handles: Vec<TaskHandle> = (0..10)
        .map(|_| scheduler.submit(|| {}, Priority::Medium, 0).unwrap())
        .collect();
    finish(&scheduler);

    for handle in handles {
        let started = handle.execution_started_at().expect("Task never started");
        assert!(started >= handle.submitted_at());
    }
}

#[test]
fn test_delayed_task_waits_at_least_its_delay() {
    let scheduler = scheduler(2);
    let handles: Vec<TaskHandle> = [30u64, 60, 90]
        .into_iter()
        .map(|delay| scheduler.submit(|| {}, Priority::Medium, delay).unwrap())
        .collect();
    finish(&scheduler);

    for handle in handles {
        let wait = handle.queue_wait().expect("Task never started");
        assert!(wait >= handle.delay(), "waited {:?}, delay {:?}", wait, handle.delay());
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_same_priority_runs_in_submission_order() {
    let scheduler = scheduler(1);
    let release = block_worker(&scheduler);

    let log = recorder();
    let labels = ["a", "b", "c", "d", "e", "f"];
    let handles: Vec<TaskHandle> = labels
        .iter()
        .map(|&label| scheduler.submit(record(&log, label), Priority::Low, 0).unwrap())
        .collect();

    release.send(()).unwrap();
    finish(&scheduler);

    assert_eq!(*log.lock().unwrap(), labels);
    let starts: Vec<_> = handles.iter().map(|h| h.execution_started_at().unwrap()).collect();
    assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_high_submitted_after_low_runs_first() {
    let scheduler = scheduler(1);
    let release = block_worker(&scheduler);

    let log = recorder();
    let low = scheduler.submit(record(&log, "low"), Priority::Low, 0).unwrap();
    let high = scheduler.submit(record(&log, "high"), Priority::High, 0).unwrap();

    release.send(()).unwrap();
    finish(&scheduler);

    assert_eq!(*log.lock().unwrap(), ["high", "low"]);
    assert!(high.execution_started_at().unwrap() <= low.execution_started_at().unwrap());
}

#[test]
fn test_priorities_drain_high_medium_low() {
    let scheduler = scheduler(1);
    let release = block_worker(&scheduler);

    let log = recorder();
    scheduler.submit(record(&log, "low-1"), Priority::Low, 0).unwrap();
    scheduler.submit(record(&log, "medium-1"), Priority::Medium, 0).unwrap();
    scheduler.submit(record(&log, "high-1"), Priority::High, 0).unwrap();
    scheduler.submit(record(&log, "low-2"), Priority::Low, 0).unwrap();
    scheduler.submit(record(&log, "high-2"), Priority::High, 0).unwrap();

    release.send(()).unwrap();
    finish(&scheduler);

    assert_eq!(*log.lock().unwrap(), ["high-1", "high-2", "medium-1", "low-1", "low-2"]);
}

#[test]
fn test_expired_delayed_task_competes_by_priority() {
    let scheduler = scheduler(1);
    let release = block_worker(&scheduler);

    let log = recorder();
    scheduler.submit(record(&log, "low"), Priority::Low, 0).unwrap();
    let delayed = scheduler.submit(record(&log, "high-delayed"), Priority::High, 20).unwrap();

    // Let the delay expire while the worker is still busy
    thread::sleep(Duration::from_millis(200));
    release.send(()).unwrap();
    finish(&scheduler);

    assert_eq!(*log.lock().unwrap(), ["high-delayed", "low"]);
    assert!(delayed.queue_wait().unwrap() >= Duration::from_millis(20));
}

// =============================================================================
// Dispatch accounting
// =============================================================================

#[test]
fn test_mixed_tasks_each_run_exactly_once() {
    let scheduler = scheduler(4);
    let latch = Arc::new(CompletionLatch::new(20));
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..20).map(|_| AtomicUsize::new(0)).collect());

    for i in 0..20 {
        let latch = Arc::clone(&latch);
        let runs = Arc::clone(&runs);
        let priority = Priority::ALL[i % 3];
        scheduler
            .submit(
                move || {
                    runs[i].fetch_add(1, Ordering::SeqCst);
                    latch.count_down();
                },
                priority,
                0,
            )
            .unwrap();
    }

    assert!(latch.wait_timeout(WAIT), "Not every task completed");
    finish(&scheduler);

    assert!(runs.iter().all(|count| count.load(Ordering::SeqCst) == 1));
    let metrics = scheduler.metrics();
    assert_eq!(metrics.submitted, 20);
    assert_eq!(metrics.completed, 20);
    assert_eq!(metrics.pending(), 0);
}

#[test]
fn test_concurrent_submitters() {
    let scheduler = Arc::new(scheduler(4));
    let executed = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let scheduler = Arc::clone(&scheduler);
            let executed = Arc::clone(&executed);
            thread::spawn(move || {
                for i in 0..50 {
                    let executed = Arc::clone(&executed);
                    let delay = if i % 5 == 0 { 5 } else { 0 };
                    scheduler
                        .submit(
                            move || {
                                executed.fetch_add(1, Ordering::SeqCst);
                            },
                            Priority::ALL[(t + i) % 3],
                            delay,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    finish(&scheduler);
    assert_eq!(executed.load(Ordering::SeqCst), 200);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_submit_after_shutdown_never_runs() {
    let scheduler = scheduler(2);
    scheduler.shutdown();

    let ran = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&ran);
    let result = scheduler.submit(
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
        Priority::High,
        0,
    );
    assert!(matches!(result, Err(SchedulerError::ShutDown)));

    scheduler.await_termination().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_delayed_task_drains_after_shutdown() {
    let scheduler = scheduler(1);
    let handle = scheduler.submit(|| {}, Priority::Low, 50).unwrap();
    scheduler.shutdown();
    scheduler.await_termination().unwrap();

    assert!(handle.is_finished());
    assert!(handle.queue_wait().unwrap() >= Duration::from_millis(50));
}

#[test]
fn test_queued_tasks_drain_after_shutdown() {
    let scheduler = scheduler(1);
    let release = block_worker(&scheduler);
    let handles: Vec<TaskHandle> = (0..5)
        .map(|_| scheduler.submit(|| {}, Priority::Medium, 0).unwrap())
        .collect();

    scheduler.shutdown();
    assert!(scheduler.submit(|| {}, Priority::High, 0).is_err());
    release.send(()).unwrap();
    scheduler.await_termination().unwrap();

    assert!(handles.iter().all(TaskHandle::is_finished));
}

#[test]
fn test_concurrent_shutdown_calls() {
    let scheduler = Arc::new(scheduler(2));
    let callers: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.shutdown())
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    assert!(scheduler.is_shutdown());
    scheduler.await_termination().unwrap();
}

#[test]
fn test_failing_actions_are_isolated() {
    let scheduler = scheduler(2);
    let failed = scheduler
        .submit_fallible(|| Err(eyre::eyre!("disk full")), Priority::High, 0)
        .unwrap();
    let panicked = scheduler.submit(|| panic!("bad state"), Priority::High, 0).unwrap();
    let ok = scheduler.submit(|| {}, Priority::Low, 5).unwrap();
    finish(&scheduler);

    assert!(!failed.outcome().unwrap().is_success());
    assert!(!panicked.outcome().unwrap().is_success());
    assert!(ok.outcome().unwrap().is_success());
    assert_eq!(scheduler.metrics().failed, 2);
}
