//! Firing pipeline under concurrent load.

use async_trait::async_trait;
use jobwarden::testing::{ScriptedHandler, TestHarness};
use jobwarden::{
    EngineContext, Event, EventBus, EventHandler, ExecutionStatus, Job, JobId, Pipeline, Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Recording event handler for verifying events.
struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    async fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

#[tokio::test]
async fn test_counter_returns_to_baseline_after_burst() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_delay(Duration::from_millis(50)));
    let pipeline = Arc::new(
        harness
            .pipeline(
                Job::new(1, "burst", "@hourly", "true").with_multi_exec(true),
                handler.clone(),
            )
            .unwrap(),
    );
    let baseline = harness.ctx.in_flight();

    let firings: Vec<_> = (0..20)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.fire(Trigger::Scheduled).await })
        })
        .collect();
    for firing in firings {
        assert_eq!(firing.await.unwrap().status, ExecutionStatus::Finished);
    }

    assert_eq!(harness.ctx.in_flight(), baseline);
    assert_eq!(harness.records().len(), 20);
    assert_eq!(handler.calls(), 20);
    assert!(handler.max_concurrent() > 1);
}

#[tokio::test]
async fn test_overlapping_firings_cancel_without_handler_call() {
    let harness = TestHarness::default();
    let handler = Arc::new(ScriptedHandler::succeeding().with_delay(Duration::from_millis(200)));
    let pipeline = Arc::new(
        harness
            .pipeline(Job::new(1, "single", "@hourly", "true"), handler.clone())
            .unwrap(),
    );

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.fire(Trigger::Scheduled).await })
    };
    while !harness.ctx.guard().is_running(JobId::new(1)) {
        tokio::task::yield_now().await;
    }

    let rejected: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.fire(Trigger::Manual).await })
        })
        .collect();
    for firing in rejected {
        assert_eq!(firing.await.unwrap().status, ExecutionStatus::Cancelled);
    }
    assert_eq!(first.await.unwrap().status, ExecutionStatus::Finished);

    let records = harness.records();
    let cancelled = records
        .iter()
        .filter(|r| r.status == ExecutionStatus::Cancelled)
        .count();
    assert_eq!(cancelled, 5);
    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.max_concurrent(), 1);
    assert!(!harness.ctx.guard().is_running(JobId::new(1)));
}

#[tokio::test]
async fn test_events_follow_firing_lifecycle() {
    let harness = TestHarness::default();
    let recorder = RecordingHandler::new();
    let event_bus = Arc::new(EventBus::new());
    event_bus.register(recorder.clone()).await;

    let ctx = Arc::new(
        EngineContext::new(harness.repository.clone(), harness.notifier.clone())
            .with_event_bus(event_bus)
            .with_backoff_unit(Duration::from_millis(5)),
    );
    let handler = Arc::new(ScriptedHandler::new(2));
    let pipeline = Pipeline::build(
        Job::new(1, "flaky", "@hourly", "true").with_retry_times(3),
        &TestHarness::registry(handler),
        ctx,
    )
    .unwrap();

    let report = pipeline.fire(Trigger::Scheduled).await;
    assert_eq!(report.retries_used, 2);

    assert_eq!(
        recorder
            .count(|e| matches!(e, Event::FiringStarted { .. }))
            .await,
        1
    );
    assert_eq!(
        recorder
            .count(|e| matches!(e, Event::AttemptFailed { .. }))
            .await,
        2
    );
    assert_eq!(
        recorder
            .count(|e| matches!(
                e,
                Event::FiringCompleted {
                    status: ExecutionStatus::Finished,
                    retries_used: 2,
                    ..
                }
            ))
            .await,
        1
    );
}
