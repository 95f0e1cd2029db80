//! Testing utilities for users of the jobwarden library.
//!
//! - [`ScriptedHandler`]: a handler that fails N times then succeeds
//! - [`RecordingNotifier`]: a sink that keeps every message
//! - [`FailingRepository`]: a repository with switchable failures
//! - [`TestHarness`]: an engine context wired to the helpers above

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::job::{Job, Protocol};
use crate::core::record::{ExecutionRecord, LogUpdate};
use crate::core::types::{JobId, LogId};
use crate::execution::{EngineContext, Pipeline, ShellDialect};
use crate::handlers::{Handler, HandlerError, HandlerOutcome, HandlerRegistry};
use crate::notify::{NotificationSink, NotifyMessage};
use crate::scheduler::SchedulingError;
use crate::storage::{InMemoryRepository, JobRepository, RepositoryError};

/// A handler that fails a set number of times, then succeeds.
///
/// # Example
///
/// ```
/// use jobwarden::testing::ScriptedHandler;
///
/// let handler = ScriptedHandler::new(2).with_output("done");
/// assert_eq!(handler.calls(), 0);
/// ```
pub struct ScriptedHandler {
    fail_count: u32,
    error: HandlerError,
    output: String,
    failure_output: String,
    delay: Option<Duration>,
    panic_on_failure: bool,
    dialect: Option<ShellDialect>,
    calls: AtomicU32,
    active: AtomicUsize,
    max_active: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    /// Fail the first `fail_count` calls with a non-zero exit.
    pub fn new(fail_count: u32) -> Self {
        Self {
            fail_count,
            error: HandlerError::NonZeroExit { code: Some(1) },
            output: "ok".to_string(),
            failure_output: String::new(),
            delay: None,
            panic_on_failure: false,
            dialect: Some(ShellDialect::Posix),
            calls: AtomicU32::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Always succeed.
    pub fn succeeding() -> Self {
        Self::new(0)
    }

    /// Never succeed.
    pub fn failing() -> Self {
        Self::new(u32::MAX)
    }

    pub fn with_error(mut self, error: HandlerError) -> Self {
        self.error = error;
        self
    }

    /// Output returned by successful calls.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Output returned by failing calls.
    pub fn with_failure_output(mut self, output: impl Into<String>) -> Self {
        self.failure_output = output.into();
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Panic instead of returning an error on failing calls.
    pub fn panicking(mut self) -> Self {
        self.panic_on_failure = true;
        self
    }

    pub fn with_dialect(mut self, dialect: Option<ShellDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Number of calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Commands received, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn run(&self, job: &Job) -> HandlerOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().push(job.command.clone());

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.fail_count {
            if self.panic_on_failure {
                panic!("scripted failure {}", call + 1);
            }
            HandlerOutcome::failure(self.failure_output.clone(), self.error.clone())
        } else {
            HandlerOutcome::success(self.output.clone())
        }
    }

    fn dialect(&self) -> Option<ShellDialect> {
        self.dialect
    }
}

/// A sink that records every pushed message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotifyMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<NotifyMessage> {
        self.messages.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn push(&self, message: NotifyMessage) {
        self.messages.lock().push(message);
    }
}

/// A repository wrapper whose operations can be made to fail.
#[derive(Default)]
pub struct FailingRepository {
    inner: InMemoryRepository,
    fail_list_enabled: AtomicBool,
    fail_create_log: AtomicBool,
    fail_update_log: AtomicBool,
}

impl FailingRepository {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    pub fn set_fail_list_enabled(&self, fail: bool) {
        self.fail_list_enabled.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create_log(&self, fail: bool) {
        self.fail_create_log.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update_log(&self, fail: bool) {
        self.fail_update_log.store(fail, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::Persistence(format!(
                "injected {operation} failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for FailingRepository {
    async fn list_enabled(&self) -> Result<Vec<Job>, RepositoryError> {
        Self::injected(&self.fail_list_enabled, "list_enabled")?;
        self.inner.list_enabled().await
    }

    async fn get(&self, id: JobId) -> Result<Job, RepositoryError> {
        self.inner.get(id).await
    }

    async fn create_log(&self, record: ExecutionRecord) -> Result<LogId, RepositoryError> {
        Self::injected(&self.fail_create_log, "create_log")?;
        self.inner.create_log(record).await
    }

    async fn update_log(&self, id: LogId, update: LogUpdate) -> Result<(), RepositoryError> {
        Self::injected(&self.fail_update_log, "update_log")?;
        self.inner.update_log(id, update).await
    }

    async fn list_logs(
        &self,
        job_id: JobId,
        limit: usize,
    ) -> Result<Vec<(LogId, ExecutionRecord)>, RepositoryError> {
        self.inner.list_logs(job_id, limit).await
    }
}

/// Engine context wired to a failing-capable repository and a recording
/// notifier, with a short backoff unit.
pub struct TestHarness {
    pub repository: Arc<FailingRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: Arc<EngineContext>,
}

impl TestHarness {
    /// Harness with the given backoff unit.
    pub fn new(backoff_unit: Duration) -> Self {
        let repository = Arc::new(FailingRepository::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let ctx = EngineContext::new(repository.clone(), notifier.clone())
            .with_backoff_unit(backoff_unit);
        Self {
            repository,
            notifier,
            ctx: Arc::new(ctx),
        }
    }

    /// Registry routing every protocol to `handler`.
    pub fn registry(handler: Arc<dyn Handler>) -> HandlerRegistry {
        HandlerRegistry::new()
            .with_handler(Protocol::Local, handler.clone())
            .with_handler(Protocol::Remote, handler.clone())
            .with_handler(Protocol::Http, handler)
    }

    /// Build a pipeline for `job` running on `handler`.
    pub fn pipeline(&self, job: Job, handler: Arc<dyn Handler>) -> Result<Pipeline, SchedulingError> {
        Pipeline::build(job, &Self::registry(handler), Arc::clone(&self.ctx))
    }

    /// Every record written so far, oldest first.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.repository.inner().all_logs().unwrap_or_default()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}
