//! Configuration file to running scheduler.

use jobwarden::testing::{ScriptedHandler, TestHarness};
use jobwarden::{ConfigError, JobId, JobRepository, Scheduler, YamlLoader};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::common::wait_until;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_config_file_drives_scheduler() {
    let file = write_config(
        r#"
settings:
  tick_interval_ms: 20
  retry_backoff_secs: 1
jobs:
  - id: 1
    name: every-second
    spec: "@every 1s"
    command: "true"
  - id: 2
    name: disabled
    spec: "@every 1s"
    command: "true"
    enabled: false
"#,
    );
    let config = YamlLoader::load(file.path()).unwrap();

    let harness = TestHarness::new(config.settings.backoff_unit());
    for job in &config.jobs {
        harness.repository.inner().insert_job(job.clone()).unwrap();
    }
    let handler = Arc::new(ScriptedHandler::succeeding());
    let (handle, _task) = Scheduler::new(Arc::clone(&harness.ctx))
        .with_handlers(TestHarness::registry(handler.clone()))
        .with_tick_interval(config.settings.tick_interval())
        .with_timezone(config.timezone)
        .start();

    assert!(handle.load_enabled().await.unwrap().is_empty());
    assert_eq!(handle.registered_jobs().await.unwrap(), vec![JobId::new(1)]);

    wait_until(Duration::from_secs(5), || handler.calls() >= 1).await;
    assert!(handle.shutdown(Duration::from_secs(5)).await);

    let logs = harness
        .repository
        .list_logs(JobId::new(1), 10)
        .await
        .unwrap();
    assert!(!logs.is_empty());
    assert!(harness
        .repository
        .list_logs(JobId::new(2), 10)
        .await
        .unwrap()
        .is_empty());
}

#[test]
fn test_missing_file_reports_path() {
    let err = YamlLoader::load("/nonexistent/jobwarden.yaml").unwrap_err();
    match err {
        ConfigError::FileReadError { path, .. } => {
            assert_eq!(path.to_str(), Some("/nonexistent/jobwarden.yaml"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_yaml_is_rejected() {
    let file = write_config("jobs: [ {id: 1, name: ");
    assert!(matches!(
        YamlLoader::load(file.path()).unwrap_err(),
        ConfigError::YamlError(_)
    ));
}
