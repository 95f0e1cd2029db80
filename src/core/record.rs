//! Execution records and the transient result of a firing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::{Job, Protocol};
use super::types::{JobId, LogId};

/// Status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The firing is executing attempts.
    Running,
    /// The final attempt succeeded.
    Finished,
    /// Every attempt failed.
    Failed,
    /// The firing overlapped a running one and made no attempt.
    Cancelled,
    /// The job runs in the background; completion is reported elsewhere.
    Background,
}

impl ExecutionStatus {
    /// Whether no further update may follow.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Finished => "finished",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Background => "background",
        };
        f.write_str(name)
    }
}

/// A persisted log entry describing one firing.
///
/// The job fields are a snapshot taken at fire time, so later edits to the
/// job do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_id: JobId,
    pub name: String,
    pub spec: String,
    pub protocol: Protocol,
    pub command: String,
    pub timeout_secs: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub result: String,
    pub retries_used: u8,
    /// Correlation token, present only for background jobs.
    pub token: Option<String>,
}

impl ExecutionRecord {
    /// Snapshot `job` into a record with the given status, started now.
    pub fn snapshot(job: &Job, status: ExecutionStatus) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            spec: job.spec.clone(),
            protocol: job.protocol,
            command: job.command.clone(),
            timeout_secs: job.timeout_secs,
            started_at: Utc::now(),
            finished_at: None,
            status,
            result: String::new(),
            retries_used: 0,
            token: None,
        }
    }

    /// Attach a correlation token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach a result text.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    /// Stamp an end time, for records that are terminal on creation.
    pub fn finished_now(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Apply a terminal update.
    pub fn apply(&mut self, update: LogUpdate) {
        self.status = update.status;
        self.result = update.result;
        self.retries_used = update.retries_used;
        self.finished_at = Some(update.finished_at);
    }
}

/// The single terminal update written at the end of a firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUpdate {
    pub status: ExecutionStatus,
    pub result: String,
    pub retries_used: u8,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of the attempt loop, bridging handler output to the log update
/// and the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    /// Description of the final attempt's error, if it failed.
    pub error: Option<String>,
    pub retries_used: u8,
    pub is_async: bool,
}

impl ExecutionResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Result text as stored: the error description, a newline, then output.
    pub fn result_text(&self) -> String {
        match &self.error {
            Some(error) => format!("{error}\n{}", self.output),
            None => self.output.clone(),
        }
    }

    /// Terminal status for this result.
    pub fn status(&self) -> ExecutionStatus {
        if self.is_async {
            ExecutionStatus::Background
        } else if self.is_failure() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Finished
        }
    }

    /// Build the log update stamped now.
    pub fn to_update(&self) -> LogUpdate {
        LogUpdate {
            status: self.status(),
            result: self.result_text(),
            retries_used: self.retries_used,
            finished_at: Utc::now(),
        }
    }
}
