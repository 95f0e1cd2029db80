//! Scheduler facade integration tests.
//!
//! Registration from the repository, manual runs, stop and shutdown.

use jobwarden::testing::{ScriptedHandler, TestHarness};
use jobwarden::{
    ExecutionStatus, Job, JobId, Protocol, Scheduler, SchedulerState,
    SchedulingError,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{wait_for_terminal_records, wait_until};

fn scheduler(harness: &TestHarness, handler: Arc<ScriptedHandler>) -> Scheduler {
    Scheduler::new(Arc::clone(&harness.ctx))
        .with_handlers(TestHarness::registry(handler))
        .with_tick_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn test_load_enabled_registers_only_enabled_jobs() {
    let harness = TestHarness::default();
    let repo = harness.repository.inner();
    repo.insert_job(Job::new(1, "a", "@hourly", "true")).unwrap();
    repo.insert_job(Job::new(2, "b", "@hourly", "true").with_enabled(false))
        .unwrap();
    repo.insert_job(Job::new(3, "c", "@daily", "true")).unwrap();

    let (handle, _task) = scheduler(&harness, Arc::new(ScriptedHandler::succeeding())).start();
    let failures = handle.load_enabled().await.unwrap();

    assert!(failures.is_empty());
    assert_eq!(
        handle.registered_jobs().await.unwrap(),
        vec![JobId::new(1), JobId::new(3)]
    );
}

#[tokio::test]
async fn test_load_enabled_propagates_repository_error() {
    let harness = TestHarness::default();
    harness.repository.set_fail_list_enabled(true);

    let (handle, _task) = scheduler(&harness, Arc::new(ScriptedHandler::succeeding())).start();
    let err = handle.load_enabled().await.unwrap_err();

    assert!(matches!(err, SchedulingError::Repository(_)));
}

#[tokio::test]
async fn test_batch_add_reports_failures_and_keeps_the_rest() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding());
    let (handle, _task) = Scheduler::new(Arc::clone(&harness.ctx))
        .with_handlers(
            jobwarden::HandlerRegistry::new()
                .with_handler(Protocol::Local, handler as Arc<dyn jobwarden::Handler>),
        )
        .start();

    let failures = handle
        .batch_add([
            Job::new(1, "good", "@hourly", "true"),
            Job::new(2, "bad spec", "61 * * * *", "true"),
            Job::new(3, "no handler", "@hourly", "http://x").with_protocol(Protocol::Http),
        ])
        .await;

    let failed: Vec<_> = failures.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, vec![JobId::new(2), JobId::new(3)]);
    assert!(matches!(
        failures[0].1,
        SchedulingError::InvalidSchedule { .. }
    ));
    assert!(matches!(
        failures[1].1,
        SchedulingError::UnsupportedProtocol { .. }
    ));
    assert_eq!(handle.registered_jobs().await.unwrap(), vec![JobId::new(1)]);
}

#[tokio::test]
async fn test_run_now_records_job_spec() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_output("done"));
    let (handle, _task) = scheduler(&harness, handler.clone()).start();

    handle
        .run_now(Job::new(5, "adhoc", "0 0 1 1 *", "report.sh"))
        .await
        .unwrap();
    let records = wait_for_terminal_records(&harness, 1, Duration::from_secs(5)).await;

    assert_eq!(records[0].spec, "0 0 1 1 *");
    assert_eq!(records[0].status, ExecutionStatus::Finished);
    assert_eq!(records[0].result, "done");
    assert_eq!(handler.calls(), 1);
    // A manual run does not register the job.
    assert!(handle.registered_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_job_stops_future_firings() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding());
    let (handle, _task) = scheduler(&harness, handler.clone()).start();

    handle
        .add_job(Job::new(1, "tick", "@every 1s", "true"))
        .await
        .unwrap();
    wait_until(Duration::from_secs(5), || handler.calls() >= 1).await;

    assert!(handle.remove_job(1).await.unwrap());
    let calls = handler.calls();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(handler.calls(), calls);
}

#[tokio::test]
async fn test_stop_does_not_wait_for_in_flight_firings() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_delay(Duration::from_millis(300)));
    let (handle, task) = scheduler(&harness, handler.clone()).start();

    handle
        .run_now(Job::new(1, "slow", "@hourly", "true"))
        .await
        .unwrap();
    wait_until(Duration::from_secs(5), || handle.in_flight() == 1).await;

    handle.stop().await.unwrap();
    task.await.unwrap();
    assert_eq!(handle.state().await, SchedulerState::Stopped);
    assert_eq!(handle.in_flight(), 1);

    let records = wait_for_terminal_records(&harness, 1, Duration::from_secs(5)).await;
    assert_eq!(records[0].status, ExecutionStatus::Finished);

    // Commands after stop fail on the closed channel.
    let err = handle
        .add_job(Job::new(2, "late", "@hourly", "true"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Channel(_)));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_firings() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_delay(Duration::from_millis(200)));
    let (handle, _task) = scheduler(&harness, handler.clone()).start();

    handle
        .run_now(Job::new(1, "slow", "@hourly", "true"))
        .await
        .unwrap();
    wait_until(Duration::from_secs(5), || handle.in_flight() == 1).await;

    assert!(handle.shutdown(Duration::from_secs(5)).await);
    assert_eq!(handle.in_flight(), 0);
    assert_eq!(harness.records()[0].status, ExecutionStatus::Finished);
}

#[tokio::test]
async fn test_shutdown_times_out_on_long_firing() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_delay(Duration::from_secs(10)));
    let (handle, _task) = scheduler(&harness, handler.clone()).start();

    handle
        .run_now(Job::new(1, "stuck", "@hourly", "true"))
        .await
        .unwrap();
    wait_until(Duration::from_secs(5), || handle.in_flight() == 1).await;

    assert!(!handle.shutdown(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_shutdown_aborts_retry_backoff() {
    let harness = TestHarness::new(Duration::from_secs(60));
    let handler = Arc::new(ScriptedHandler::failing());
    let (handle, _task) = scheduler(&harness, handler.clone()).start();

    handle
        .run_now(Job::new(1, "flaky", "@hourly", "false").with_retry_times(3))
        .await
        .unwrap();
    wait_until(Duration::from_secs(5), || handler.calls() == 1).await;

    assert!(handle.shutdown(Duration::from_secs(5)).await);

    let records = harness.records();
    assert_eq!(records[0].status, ExecutionStatus::Failed);
    assert_eq!(records[0].retries_used, 0);
    assert_eq!(handler.calls(), 1);
}
