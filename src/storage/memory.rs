//! In-memory repository implementation.
//!
//! Provides a thread-safe in-memory backend for the binary and for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{JobRepository, RepositoryError};
use crate::core::job::Job;
use crate::core::record::{ExecutionRecord, LogUpdate};
use crate::core::types::{JobId, LogId};

#[derive(Default)]
struct Logs {
    next_id: u64,
    records: BTreeMap<LogId, ExecutionRecord>,
}

/// In-memory repository.
///
/// Log ids are sequential starting at 1. Data is not persisted across
/// restarts.
#[derive(Default)]
pub struct InMemoryRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
    logs: RwLock<Logs>,
}

impl InMemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job definition.
    pub fn insert_job(&self, job: Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(RepositoryError::DuplicateKey(format!("job: {}", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    /// Build a repository holding `jobs`.
    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Result<Self, RepositoryError> {
        let repo = Self::new();
        for job in jobs {
            repo.insert_job(job)?;
        }
        Ok(repo)
    }

    /// Fetch a record by id.
    pub fn log(&self, id: LogId) -> Result<ExecutionRecord, RepositoryError> {
        let logs = self.logs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        logs.records
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("log: {}", id)))
    }

    /// Every record, oldest first.
    pub fn all_logs(&self) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let logs = self.logs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(logs.records.values().cloned().collect())
    }
}

#[async_trait]
impl JobRepository for InMemoryRepository {
    async fn list_enabled(&self) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        let mut result: Vec<_> = jobs.values().filter(|j| j.enabled).cloned().collect();
        result.sort_by_key(|j| j.id);
        Ok(result)
    }

    async fn get(&self, id: JobId) -> Result<Job, RepositoryError> {
        let jobs = self.jobs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("job: {}", id)))
    }

    async fn create_log(&self, record: ExecutionRecord) -> Result<LogId, RepositoryError> {
        let mut logs = self.logs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        logs.next_id += 1;
        let id = LogId::new(logs.next_id);
        logs.records.insert(id, record);
        Ok(id)
    }

    async fn update_log(&self, id: LogId, update: LogUpdate) -> Result<(), RepositoryError> {
        let mut logs = self.logs.write().map_err(|_| RepositoryError::LockPoisoned)?;
        let record = logs
            .records
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("log: {}", id)))?;
        if record.status.is_terminal() {
            return Err(RepositoryError::AlreadyTerminal(id));
        }
        record.apply(update);
        Ok(())
    }

    async fn list_logs(
        &self,
        job_id: JobId,
        limit: usize,
    ) -> Result<Vec<(LogId, ExecutionRecord)>, RepositoryError> {
        let logs = self.logs.read().map_err(|_| RepositoryError::LockPoisoned)?;
        // Ids are sequential, so descending id order is newest first.
        Ok(logs
            .records
            .iter()
            .rev()
            .filter(|(_, r)| r.job_id == job_id)
            .take(limit)
            .map(|(id, r)| (*id, r.clone()))
            .collect())
    }
}
