//! Scheduler handle for controlling the scheduler.
//!
//! This module provides the `SchedulerHandle` type that allows external
//! control of a running scheduler: registering and removing jobs, manual
//! runs, and stop or shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};

use super::types::{SchedulerCommand, SchedulerState, SchedulingError};
use crate::core::job::Job;
use crate::core::types::JobId;
use crate::execution::EngineContext;

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Poll interval while draining in-flight firings.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
    pub(crate) ctx: Arc<EngineContext>,
    pub(crate) shutdown_timeout: Duration,
}

impl SchedulerHandle {
    /// Helper to send a command and wait for its response.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulingError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| SchedulingError::Channel(format!("failed to send {} command", operation)))?;

        response_rx.await.map_err(|_| {
            SchedulingError::Channel(format!("failed to receive {} response", operation))
        })
    }

    /// Register `job` under its cron spec, replacing any previous registration.
    pub async fn add_job(&self, job: Job) -> Result<(), SchedulingError> {
        self.send_command(
            |response| SchedulerCommand::AddJob {
                job: Box::new(job),
                response,
            },
            "add_job",
        )
        .await?
    }

    /// Deregister a job. In-flight firings are unaffected.
    ///
    /// Returns whether the job was registered.
    pub async fn remove_job(&self, job_id: impl Into<JobId>) -> Result<bool, SchedulingError> {
        let job_id = job_id.into();
        self.send_command(
            |response| SchedulerCommand::RemoveJob { job_id, response },
            "remove_job",
        )
        .await
    }

    /// Register each job in turn.
    ///
    /// Jobs that fail to register are logged and returned with their error;
    /// the rest are registered.
    pub async fn batch_add(
        &self,
        jobs: impl IntoIterator<Item = Job>,
    ) -> Vec<(JobId, SchedulingError)> {
        let mut failures = Vec::new();
        for job in jobs {
            let job_id = job.id;
            if let Err(e) = self.add_job(job).await {
                let closed = matches!(e, SchedulingError::Channel(_));
                failures.push((job_id, e));
                if closed {
                    break;
                }
            }
        }
        failures
    }

    /// Register every enabled job from the repository.
    pub async fn load_enabled(&self) -> Result<Vec<(JobId, SchedulingError)>, SchedulingError> {
        let jobs = self.ctx.repository().list_enabled().await?;
        tracing::info!(count = jobs.len(), "Loading enabled jobs");
        Ok(self.batch_add(jobs).await)
    }

    /// Fire `job` once, now, on an independent task.
    ///
    /// Returns once the run is accepted; the firing's outcome is recorded in
    /// the repository.
    pub async fn run_now(&self, job: Job) -> Result<(), SchedulingError> {
        self.send_command(
            |response| SchedulerCommand::RunNow {
                job: Box::new(job),
                response,
            },
            "run_now",
        )
        .await?
    }

    /// Ids of registered jobs, ascending.
    pub async fn registered_jobs(&self) -> Result<Vec<JobId>, SchedulingError> {
        self.send_command(|response| SchedulerCommand::ListJobs { response }, "list_jobs")
            .await
    }

    /// Stop the timer loop. In-flight firings keep running.
    pub async fn stop(&self) -> Result<(), SchedulingError> {
        if self.state().await == SchedulerState::Stopped {
            return Ok(());
        }
        self.send_command(|response| SchedulerCommand::Stop { response }, "stop")
            .await
    }

    /// Stop, abort pending retry backoffs, and wait up to `timeout` for
    /// in-flight firings to finish.
    ///
    /// Returns `true` if every firing finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if let Err(e) = self.stop().await {
            tracing::debug!(error = %e, "Scheduler loop already gone");
        }
        self.ctx.shutdown_token().cancel();

        let running_count = self.ctx.in_flight();
        if running_count == 0 {
            tracing::info!("No in-flight firings to wait for during shutdown");
            return true;
        }

        tracing::info!(
            "Graceful shutdown: waiting for {} in-flight firing(s) (timeout: {:?})",
            running_count,
            timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + timeout;
        loop {
            let remaining = self.ctx.in_flight();
            if remaining == 0 {
                tracing::info!("All in-flight firings completed in {:?}", start.elapsed());
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "Graceful shutdown timeout ({:?}) exceeded with {} firing(s) still running",
                    timeout,
                    remaining
                );
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// [`shutdown`](Self::shutdown) with the scheduler's configured timeout.
    pub async fn shutdown_default(&self) -> bool {
        self.shutdown(self.shutdown_timeout).await
    }

    /// Firings currently in flight.
    pub fn in_flight(&self) -> usize {
        self.ctx.in_flight()
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the timer loop is running.
    pub async fn is_running(&self) -> bool {
        self.state().await == SchedulerState::Running
    }
}
