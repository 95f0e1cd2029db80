//! Per-job firing pipeline.
//!
//! A [`Pipeline`] is built once per job and fired for every scheduled
//! occurrence or manual run. One firing moves through:
//!
//! ```text
//! Pending -> Admitted | Rejected
//! Admitted -> Running -> (Retrying)* -> Finished | Failed | Background
//! Rejected -> Cancelled
//! ```
//!
//! The execution counter is held for the whole firing and the run guard
//! mark for the attempt loop; both are released by `Drop`, so a panic in a
//! firing leaves neither behind.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::context::EngineContext;
use super::env::{TASK_ID_VAR, correlation_token, format_env_assignment};
use crate::core::job::Job;
use crate::core::record::{ExecutionRecord, ExecutionResult, ExecutionStatus};
use crate::core::types::{JobId, LogId};
use crate::events::Event;
use crate::handlers::{Handler, HandlerError, HandlerOutcome, HandlerRegistry};
use crate::notify::NotifyMessage;
use crate::scheduler::SchedulingError;

/// What caused a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A cron occurrence.
    Scheduled,
    /// An explicit run-now request.
    Manual,
}

/// Summary of one firing, for direct callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiringReport {
    pub job_id: JobId,
    pub status: ExecutionStatus,
    /// Record written for the firing; `None` if it could not be created.
    pub log_id: Option<LogId>,
    pub retries_used: u8,
}

/// Executes firings of one job.
pub struct Pipeline {
    job: Arc<Job>,
    handler: Arc<dyn Handler>,
    ctx: Arc<EngineContext>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("job", &self.job).finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pick the handler for the job's protocol.
    pub fn build(
        job: Job,
        registry: &HandlerRegistry,
        ctx: Arc<EngineContext>,
    ) -> Result<Self, SchedulingError> {
        let handler = registry
            .get(job.protocol)
            .ok_or(SchedulingError::UnsupportedProtocol {
                job_id: job.id,
                protocol: job.protocol,
            })?;
        Ok(Self {
            job: Arc::new(job),
            handler,
            ctx,
        })
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Run one firing to completion.
    pub async fn fire(&self, trigger: Trigger) -> FiringReport {
        let _in_flight = self.ctx.counter().enter();
        let job = &*self.job;

        let mark = if job.multi_exec {
            None
        } else {
            match self.ctx.guard().try_acquire(job.id) {
                Some(mark) => Some(mark),
                None => return self.reject(trigger).await,
            }
        };

        let mut record = ExecutionRecord::snapshot(job, ExecutionStatus::Running);
        let mut attempt_job = job.clone();
        if job.is_background() {
            let token = correlation_token();
            if let Some(dialect) = self.handler.dialect() {
                match format_env_assignment(TASK_ID_VAR, &token, dialect) {
                    Ok(prefix) => attempt_job.command = format!("{prefix}{}", job.command),
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "Failed to inject task id");
                    }
                }
            }
            record = record.with_token(token);
        }

        let log_id = match self.ctx.repository().create_log(record).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to create execution record, abandoning firing");
                return FiringReport {
                    job_id: job.id,
                    status: ExecutionStatus::Failed,
                    log_id: None,
                    retries_used: 0,
                };
            }
        };

        tracing::info!(job_id = %job.id, log_id = %log_id, trigger = ?trigger, "Firing started");
        self.ctx
            .event_bus()
            .emit(Event::firing_started(job.id, log_id))
            .await;

        let started = Instant::now();
        let (outcome, retries_used) = self.execute_with_retry(&attempt_job).await;
        if let Some(mark) = mark {
            mark.release();
        }

        let result = ExecutionResult {
            output: outcome.output,
            error: outcome.error.map(|e| e.to_string()),
            retries_used,
            is_async: job.is_background(),
        };
        let update = result.to_update();
        let status = update.status;
        if let Err(e) = self.ctx.repository().update_log(log_id, update).await {
            tracing::warn!(job_id = %job.id, log_id = %log_id, error = %e, "Failed to update execution record");
        }

        tracing::info!(job_id = %job.id, log_id = %log_id, status = %status, retries_used, "Firing completed");
        self.ctx
            .event_bus()
            .emit(Event::firing_completed(
                job.id,
                log_id,
                status,
                retries_used,
                started.elapsed(),
            ))
            .await;

        self.notify(&result).await;

        FiringReport {
            job_id: job.id,
            status,
            log_id: Some(log_id),
            retries_used,
        }
    }

    /// Write the single Cancel record for an overlapping firing.
    async fn reject(&self, trigger: Trigger) -> FiringReport {
        let job = &*self.job;
        tracing::info!(job_id = %job.id, trigger = ?trigger, "Previous firing still running, cancelling");

        let record = ExecutionRecord::snapshot(job, ExecutionStatus::Cancelled)
            .with_result("previous firing still running")
            .finished_now();
        let log_id = match self.ctx.repository().create_log(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to record cancelled firing");
                None
            }
        };

        self.ctx
            .event_bus()
            .emit(Event::firing_rejected(job.id))
            .await;

        FiringReport {
            job_id: job.id,
            status: ExecutionStatus::Cancelled,
            log_id,
            retries_used: 0,
        }
    }

    /// Attempt loop. Returns the last outcome and the retries performed.
    async fn execute_with_retry(&self, job: &Job) -> (HandlerOutcome, u8) {
        let policy = job.retry_policy(self.ctx.backoff_unit());
        let mut attempt: u32 = 0;

        let outcome = loop {
            attempt += 1;
            let outcome = self.attempt(job).await;
            let Some(error) = &outcome.error else {
                break outcome;
            };
            if !policy.should_retry(attempt) {
                tracing::warn!(job_id = %job.id, attempt, error = %error, "Final attempt failed");
                break outcome;
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                job_id = %job.id,
                attempt,
                max_attempts = policy.max_attempts(),
                retry_in = ?delay,
                error = %error,
                "Attempt failed, retrying"
            );
            self.ctx
                .event_bus()
                .emit(Event::attempt_failed(
                    job.id,
                    attempt,
                    policy.max_attempts(),
                    error.to_string(),
                    delay,
                ))
                .await;

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = self.ctx.shutdown_token().cancelled() => true,
            };
            if interrupted {
                tracing::info!(job_id = %job.id, attempt, "Shutdown interrupted retry backoff");
                break outcome;
            }
        };

        let retries_used = u8::try_from(attempt - 1).unwrap_or(u8::MAX);
        (outcome, retries_used)
    }

    /// One attempt, with panics turned into failures.
    async fn attempt(&self, job: &Job) -> HandlerOutcome {
        match AssertUnwindSafe(self.handler.run(job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(job_id = %job.id, error = %message, "Attempt panicked");
                HandlerOutcome::failure("", HandlerError::Panicked(message))
            }
        }
    }

    async fn notify(&self, result: &ExecutionResult) {
        let job = &*self.job;
        if result.is_async || !job.notify.should_notify(result.is_failure()) {
            return;
        }
        let message = NotifyMessage::for_job(job, result.is_failure(), result.result_text());
        self.ctx.notifier().push(message).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
