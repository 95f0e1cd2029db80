//! Scheduler type definitions.
//!
//! This module contains error types, state enums, and command types for the scheduler.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::job::{Job, Protocol};
use crate::core::schedule::ScheduleError;
use crate::core::types::JobId;
use crate::storage::RepositoryError;

/// Errors raised while registering or dispatching jobs.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// No handler is registered for the job's protocol.
    #[error("job {job_id}: no handler for protocol {protocol}")]
    UnsupportedProtocol { job_id: JobId, protocol: Protocol },

    /// The job's cron spec could not be parsed.
    #[error("job {job_id}: {source}")]
    InvalidSchedule {
        job_id: JobId,
        #[source]
        source: ScheduleError,
    },

    /// Loading jobs from the repository failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The scheduler loop is gone.
    #[error("channel error: {0}")]
    Channel(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// The timer loop is running.
    Running,
    /// The timer loop has exited; no further firings are scheduled.
    Stopped,
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Register a job, replacing any previous registration.
    AddJob {
        job: Box<Job>,
        response: oneshot::Sender<Result<(), SchedulingError>>,
    },
    /// Deregister a job.
    RemoveJob {
        job_id: JobId,
        response: oneshot::Sender<bool>,
    },
    /// Fire a job once, now.
    RunNow {
        job: Box<Job>,
        response: oneshot::Sender<Result<(), SchedulingError>>,
    },
    /// Ids of registered jobs.
    ListJobs {
        response: oneshot::Sender<Vec<JobId>>,
    },
    /// Stop the timer loop.
    Stop { response: oneshot::Sender<()> },
}
