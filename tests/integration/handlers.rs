//! Real handlers behind the firing pipeline.
//!
//! HTTP jobs run against a wiremock server; local jobs run through the
//! system shell.

use jobwarden::testing::TestHarness;
use jobwarden::{
    ExecutionStatus, Handler, HttpHandler, Job, LocalHandler, Protocol, ReqwestHttpClient,
    Trigger,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_handler() -> Arc<dyn Handler> {
    Arc::new(HttpHandler::new(Arc::new(ReqwestHttpClient::new().unwrap())))
}

#[tokio::test]
async fn test_http_job_succeeds_on_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::default();
    let job = Job::new(1, "health", "@hourly", format!("{}/health", server.uri()))
        .with_protocol(Protocol::Http)
        .with_timeout_secs(5);
    let report = harness
        .pipeline(job, http_handler())
        .unwrap()
        .fire(Trigger::Scheduled)
        .await;

    assert_eq!(report.status, ExecutionStatus::Finished);
    assert_eq!(harness.records()[0].result, "healthy");
}

#[tokio::test]
async fn test_http_job_fails_on_404_with_body_as_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let harness = TestHarness::default();
    let job = Job::new(1, "ping", "@hourly", format!("{}/missing", server.uri()))
        .with_protocol(Protocol::Http)
        .with_timeout_secs(5);
    let report = harness
        .pipeline(job, http_handler())
        .unwrap()
        .fire(Trigger::Scheduled)
        .await;

    assert_eq!(report.status, ExecutionStatus::Failed);
    let record = &harness.records()[0];
    assert!(record.result.contains("not found"));
    assert!(record.result.starts_with("http status 404\n"));
}

#[tokio::test]
async fn test_http_job_retries_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let harness = TestHarness::default();
    let job = Job::new(1, "flaky", "@hourly", format!("{}/flaky", server.uri()))
        .with_protocol(Protocol::Http)
        .with_timeout_secs(5)
        .with_retry_times(2);
    let report = harness
        .pipeline(job, http_handler())
        .unwrap()
        .fire(Trigger::Scheduled)
        .await;

    assert_eq!(report.status, ExecutionStatus::Finished);
    assert_eq!(report.retries_used, 2);
}

#[cfg(unix)]
mod shell {
    use super::*;
    use jobwarden::NotifyPolicy;
    use jobwarden::NotifySettings;
    use std::time::Duration;

    fn local() -> Arc<dyn Handler> {
        Arc::new(LocalHandler::new())
    }

    #[tokio::test]
    async fn test_local_job_captures_stdout_then_stderr() {
        let harness = TestHarness::default();
        let job = Job::new(1, "echo", "@hourly", "echo out; echo err 1>&2");
        let report = harness
            .pipeline(job, local())
            .unwrap()
            .fire(Trigger::Scheduled)
            .await;

        assert_eq!(report.status, ExecutionStatus::Finished);
        assert_eq!(harness.records()[0].result, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_local_job_failure_notifies_with_exit_status() {
        let harness = TestHarness::default();
        let job = Job::new(1, "broken", "@hourly", "echo partial; exit 3").with_notify(
            NotifySettings {
                policy: NotifyPolicy::OnFailure,
                receivers: vec!["ops@example.com".into()],
                ..Default::default()
            },
        );
        let report = harness
            .pipeline(job, local())
            .unwrap()
            .fire(Trigger::Scheduled)
            .await;

        assert_eq!(report.status, ExecutionStatus::Failed);
        let messages = harness.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status.to_string(), "failure");
        assert_eq!(messages[0].output, "exit status 3\npartial\n");
    }

    #[tokio::test]
    async fn test_background_job_sees_its_token() {
        let harness = TestHarness::default();
        let job = Job::new(1, "bg", "@hourly", "echo \"$JOBWARDEN_TASK_ID\"")
            .with_timeout_secs(-1)
            .with_notify(NotifySettings {
                policy: NotifyPolicy::Always,
                receivers: vec!["ops@example.com".into()],
                ..Default::default()
            });
        let report = harness
            .pipeline(job, local())
            .unwrap()
            .fire(Trigger::Scheduled)
            .await;

        assert_eq!(report.status, ExecutionStatus::Background);
        let record = &harness.records()[0];
        let token = record.token.clone().unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(record.result.trim(), token);
        assert_eq!(harness.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_local_job_times_out() {
        let harness = TestHarness::default();
        let job = Job::new(1, "slow", "@hourly", "sleep 5").with_timeout_secs(1);

        let start = std::time::Instant::now();
        let report = harness
            .pipeline(job, local())
            .unwrap()
            .fire(Trigger::Scheduled)
            .await;

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(harness.records()[0].result.starts_with("timed out"));
    }
}
