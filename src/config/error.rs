//! Configuration error types.
//!
//! This module defines error types for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::job::JobError;
use crate::core::schedule::ScheduleError;
use crate::core::types::{HostId, JobId};

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a specific file with context.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Two jobs share an id.
    #[error("duplicate job id: {0}")]
    DuplicateJob(JobId),

    /// Two hosts share an id.
    #[error("duplicate host id: {0}")]
    DuplicateHost(HostId),

    /// A job names a host that is not defined.
    #[error("job {job_id} references unknown host {host}")]
    UnknownHost { job_id: JobId, host: HostId },

    /// A job definition breaks a field constraint.
    #[error(transparent)]
    InvalidJob(#[from] JobError),

    /// A job's spec does not parse.
    #[error("job {job_id}: {source}")]
    InvalidSchedule {
        job_id: JobId,
        #[source]
        source: ScheduleError,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
