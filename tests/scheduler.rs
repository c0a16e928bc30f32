//! Scheduler Integration Tests
//!
//! Submission latency, outcome recording and the periodic duty cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use papertrail::core::{Scheduler, MIN_PERIODIC_INTERVAL, SHUTDOWN_ERROR};
use papertrail::domain::{Status, TaskRecord};
use serde_json::Value;

/// Poll until the task reaches a terminal status or the deadline passes
async fn wait_finished(scheduler: &Scheduler, id: &str, deadline: Duration) -> TaskRecord {
    let start = Instant::now();
    loop {
        let record = scheduler.get_status(id).expect("task is registered");
        if record.is_finished() || start.elapsed() > deadline {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_submit_returns_before_job_completes() {
    let scheduler = Scheduler::new().unwrap();

    let start = Instant::now();
    let id = scheduler.submit(
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok("late")
        },
        None,
    );
    assert!(start.elapsed() < Duration::from_millis(100));

    let record = scheduler.get_status(&id).unwrap();
    assert!(!record.is_finished());
    assert!(scheduler.list_active().iter().any(|t| t.id == id));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_sleeping_job_completes_with_result() {
    let scheduler = Scheduler::new().unwrap();

    let id = scheduler.submit(
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            anyhow::Ok("ok")
        },
        None,
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    let early = scheduler.get_status(&id).unwrap();
    assert!(matches!(early.status, Status::Pending | Status::Processing));
    assert!(early.result.is_none());

    tokio::time::sleep(Duration::from_millis(290)).await;
    let record = wait_finished(&scheduler, &id, Duration::from_secs(2)).await;
    assert_eq!(record.status, Status::Completed);
    assert_eq!(record.result, Some(Value::from("ok")));
    assert!(record.error.is_none());

    scheduler.shutdown();
}

#[tokio::test]
async fn test_failing_job_is_recorded_not_raised() {
    let scheduler = Scheduler::new().unwrap();

    let id = scheduler.submit(async { Err::<(), _>(anyhow::anyhow!("boom")) }, None);

    let record = wait_finished(&scheduler, &id, Duration::from_secs(2)).await;
    assert_eq!(record.status, Status::Failed);
    assert!(record.error.as_deref().unwrap_or_default().contains("boom"));
    assert!(record.result.is_none());

    scheduler.shutdown();
}

#[tokio::test]
async fn test_panicking_job_does_not_kill_worker() {
    let scheduler = Scheduler::new().unwrap();

    let panicked = scheduler.submit(
        async {
            if true {
                panic!("kaboom");
            }
            anyhow::Ok(())
        },
        None,
    );
    let record = wait_finished(&scheduler, &panicked, Duration::from_secs(2)).await;
    assert_eq!(record.status, Status::Failed);
    let error = record.error.unwrap_or_default();
    assert!(error.contains("job panicked"));
    assert!(error.contains("kaboom"));

    // The worker keeps serving
    let next = scheduler.submit(async { anyhow::Ok(7) }, None);
    let record = wait_finished(&scheduler, &next, Duration::from_secs(2)).await;
    assert_eq!(record.result, Some(Value::from(7)));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_list_active_excludes_finished_tasks() {
    let scheduler = Scheduler::new().unwrap();

    let quick = scheduler.submit(async { anyhow::Ok(()) }, None);
    let slow = scheduler.submit(
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok(())
        },
        None,
    );

    wait_finished(&scheduler, &quick, Duration::from_secs(2)).await;

    let active: Vec<String> = scheduler.list_active().into_iter().map(|t| t.id).collect();
    assert!(active.contains(&slow));
    assert!(!active.contains(&quick));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_requested_ids_stay_unique() {
    let scheduler = Scheduler::new().unwrap();

    let first = scheduler.submit(async { anyhow::Ok(1) }, Some("job".to_string()));
    let second = scheduler.submit(async { anyhow::Ok(2) }, Some("job".to_string()));

    assert_eq!(first, "job");
    assert_eq!(second, "job-1");

    let first = wait_finished(&scheduler, &first, Duration::from_secs(2)).await;
    let second = wait_finished(&scheduler, &second, Duration::from_secs(2)).await;
    assert_eq!(first.result, Some(Value::from(1)));
    assert_eq!(second.result, Some(Value::from(2)));

    scheduler.shutdown();
}

#[tokio::test]
async fn test_periodic_cycle_runs_until_cancelled() {
    let scheduler = Scheduler::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let token = scheduler.schedule_periodic(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(async { anyhow::Ok("tick") })
        },
        Duration::from_millis(50),
        "tick",
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);

    token.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stopped_at = calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(calls.load(Ordering::SeqCst) <= stopped_at + 1);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_periodic_factory_error_is_retried() {
    let scheduler = Scheduler::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let ran = successes.clone();
    let token = scheduler.schedule_periodic(
        move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("factory not ready");
            }
            let ran = ran.clone();
            Ok(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
        },
        Duration::from_millis(100),
        "retry",
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);
    assert!(successes.load(Ordering::SeqCst) >= 1);

    token.cancel();
    scheduler.shutdown();
}

#[tokio::test]
async fn test_submit_after_shutdown_fails_the_task() {
    let scheduler = Scheduler::new().unwrap();
    let handle = scheduler.handle();
    scheduler.shutdown();

    let id = handle.submit(async { anyhow::Ok(()) }, None);
    let record = handle.get_status(&id).unwrap();
    assert_eq!(record.status, Status::Failed);
    assert!(record.error.unwrap_or_default().contains("shut down"));
}

#[tokio::test]
async fn test_shutdown_fails_unfinished_tasks() {
    let scheduler = Scheduler::new().unwrap();
    let handle = scheduler.handle();

    let running = handle.submit(
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok(())
        },
        None,
    );
    let done = handle.submit(async { anyhow::Ok("done") }, None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.get_status(&running).unwrap().status, Status::Processing);

    scheduler.shutdown();

    let record = handle.get_status(&running).unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.error.as_deref(), Some(SHUTDOWN_ERROR));
    assert!(handle.list_active().is_empty());

    let finished = handle.get_status(&done).unwrap();
    assert_eq!(finished.status, Status::Completed);
    assert_eq!(finished.result, Some(Value::from("done")));
}

#[tokio::test]
async fn test_zero_interval_is_raised_to_minimum() {
    let scheduler = Scheduler::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let token = scheduler.schedule_periodic(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(async { anyhow::Ok(()) })
        },
        Duration::ZERO,
        "spin",
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let ran = calls.load(Ordering::SeqCst);
    let ceiling = (100 / MIN_PERIODIC_INTERVAL.as_millis() as usize) * 2 + 2;
    assert!(ran >= 1);
    assert!(ran <= ceiling, "cycle ran {} times in 100ms", ran);

    scheduler.shutdown();
}
