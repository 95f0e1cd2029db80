//! Job definition.
//!
//! A job is a cron-scheduled command together with the policy fields that
//! control how its firings are admitted, retried, and reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::retry::{MAX_RETRY_BUDGET, RetryPolicy};
use super::types::{HostId, JobId};

/// Timeout value marking a background job.
pub const BACKGROUND_TIMEOUT: i32 = -1;

/// Largest foreground timeout, in seconds.
pub const MAX_TIMEOUT_SECS: i32 = 86_400;

/// Errors reported by [`Job::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// A required text field is empty.
    #[error("job {job_id}: {field} must not be empty")]
    EmptyField { job_id: JobId, field: &'static str },

    /// Timeout outside [-1, 86400].
    #[error("job {job_id}: timeout {timeout} is outside -1..=86400")]
    TimeoutOutOfRange { job_id: JobId, timeout: i32 },

    /// Retry budget above the maximum.
    #[error("job {job_id}: retry budget {budget} exceeds {MAX_RETRY_BUDGET}")]
    RetryBudgetOutOfRange { job_id: JobId, budget: u8 },

    /// Remote job without a host, or non-remote job with one.
    #[error("job {job_id}: host is required for remote jobs and only for them")]
    HostMismatch { job_id: JobId },

    /// HTTP jobs cannot run in the background.
    #[error("job {job_id}: http jobs cannot use background timeout")]
    BackgroundHttp { job_id: JobId },

    /// Notifications enabled with nobody to notify.
    #[error("job {job_id}: notifications enabled without receivers")]
    MissingReceivers { job_id: JobId },
}

/// Execution protocol of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Shell command on this machine.
    Local,
    /// Shell command on a remote host over a session transport.
    Remote,
    /// HTTP GET against the command, which is a URL.
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Local => "local",
            Protocol::Remote => "remote",
            Protocol::Http => "http",
        };
        f.write_str(name)
    }
}

/// When a finished firing sends a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Never notify.
    #[default]
    None,
    /// Notify only when the firing ends with an error.
    OnFailure,
    /// Notify after every foreground firing.
    Always,
}

/// Delivery channel requested for notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    #[default]
    Mail,
    Slack,
    Webhook,
}

/// Notification settings of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySettings {
    #[serde(default)]
    pub policy: NotifyPolicy,
    #[serde(default)]
    pub channel: NotifyChannel,
    #[serde(default)]
    pub receivers: Vec<String>,
}

impl NotifySettings {
    /// Decide whether a firing with the given outcome should notify.
    pub fn should_notify(&self, failed: bool) -> bool {
        match self.policy {
            NotifyPolicy::None => false,
            NotifyPolicy::OnFailure => failed,
            NotifyPolicy::Always => true,
        }
    }
}

/// A schedulable job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Cron spec, see [`crate::core::schedule::Schedule`].
    pub spec: String,
    pub protocol: Protocol,
    /// Shell command, or URL for HTTP jobs.
    pub command: String,
    /// Seconds; `-1` runs in the background, `0` means unbounded.
    pub timeout_secs: i32,
    /// Allow overlapping firings of this job.
    pub multi_exec: bool,
    /// Retries after the initial attempt (0..=10).
    pub retry_times: u8,
    /// Host reference, present iff `protocol` is [`Protocol::Remote`].
    pub host: Option<HostId>,
    pub notify: NotifySettings,
    pub enabled: bool,
}

impl Job {
    /// Create an enabled local job with no timeout, retries, or notifications.
    pub fn new(
        id: impl Into<JobId>,
        name: impl Into<String>,
        spec: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            spec: spec.into(),
            protocol: Protocol::Local,
            command: command.into(),
            timeout_secs: 0,
            multi_exec: false,
            retry_times: 0,
            host: None,
            notify: NotifySettings::default(),
            enabled: true,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: i32) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_multi_exec(mut self, multi_exec: bool) -> Self {
        self.multi_exec = multi_exec;
        self
    }

    pub fn with_retry_times(mut self, retry_times: u8) -> Self {
        self.retry_times = retry_times;
        self
    }

    pub fn with_host(mut self, host: HostId) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_notify(mut self, notify: NotifySettings) -> Self {
        self.notify = notify;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether this job runs in the background and reports completion later.
    pub fn is_background(&self) -> bool {
        self.timeout_secs == BACKGROUND_TIMEOUT
    }

    /// The bound handlers apply to one attempt, if any.
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Retry policy for this job's budget with the given backoff unit.
    pub fn retry_policy(&self, unit: Duration) -> RetryPolicy {
        RetryPolicy::new(self.retry_times, unit)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), JobError> {
        let job_id = self.id;
        if self.name.trim().is_empty() {
            return Err(JobError::EmptyField {
                job_id,
                field: "name",
            });
        }
        if self.spec.trim().is_empty() {
            return Err(JobError::EmptyField {
                job_id,
                field: "spec",
            });
        }
        if self.command.trim().is_empty() {
            return Err(JobError::EmptyField {
                job_id,
                field: "command",
            });
        }
        if !(BACKGROUND_TIMEOUT..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(JobError::TimeoutOutOfRange {
                job_id,
                timeout: self.timeout_secs,
            });
        }
        if self.retry_times > MAX_RETRY_BUDGET {
            return Err(JobError::RetryBudgetOutOfRange {
                job_id,
                budget: self.retry_times,
            });
        }
        if (self.protocol == Protocol::Remote) != self.host.is_some() {
            return Err(JobError::HostMismatch { job_id });
        }
        if self.protocol == Protocol::Http && self.is_background() {
            return Err(JobError::BackgroundHttp { job_id });
        }
        if self.notify.policy != NotifyPolicy::None && self.notify.receivers.is_empty() {
            return Err(JobError::MissingReceivers { job_id });
        }
        Ok(())
    }
}
