//! Job repository abstraction.
//!
//! Job definitions and execution records live outside the engine. The
//! engine reads enabled jobs at startup and writes one record per firing
//! through [`JobRepository`].

mod memory;

pub use memory::InMemoryRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::job::Job;
use crate::core::record::{ExecutionRecord, LogUpdate};
use crate::core::types::{JobId, LogId};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The record was already given its terminal update.
    #[error("log {0} is already terminal")]
    AlreadyTerminal(LogId),

    /// Repository lock was poisoned.
    #[error("repository lock poisoned")]
    LockPoisoned,

    /// Backend failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Source of job definitions and sink for execution records.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// All jobs with `enabled == true`.
    async fn list_enabled(&self) -> Result<Vec<Job>, RepositoryError>;

    /// Fetch one job.
    async fn get(&self, id: JobId) -> Result<Job, RepositoryError>;

    /// Persist a new record and return its id.
    async fn create_log(&self, record: ExecutionRecord) -> Result<LogId, RepositoryError>;

    /// Apply the terminal update to a record.
    async fn update_log(&self, id: LogId, update: LogUpdate) -> Result<(), RepositoryError>;

    /// Most recent records of a job, newest first.
    async fn list_logs(
        &self,
        job_id: JobId,
        limit: usize,
    ) -> Result<Vec<(LogId, ExecutionRecord)>, RepositoryError>;
}
