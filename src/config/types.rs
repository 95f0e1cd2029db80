//! Configuration file types.
//!
//! These mirror the YAML layout: a `settings` block, a list of `hosts`
//! and a list of `jobs`.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::job::{Job, NotifySettings, Protocol};
use crate::core::types::{HostId, JobId};

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_retry_backoff_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// Root of a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Timer resolution in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Backoff unit; retry k sleeps `k` units.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// How long `jw run` waits for in-flight firings on Ctrl-C.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// IANA timezone cron specs are evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            retry_backoff_secs: default_retry_backoff_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            timezone: default_timezone(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// The configured timezone, or `None` if the name is unknown.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

/// A remote host entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    pub id: HostId,
    /// Hostname or address.
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub auth: HostAuthConfig,
}

/// Credentials for a host.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostAuthConfig {
    /// Password given inline.
    Password { password: String },
    /// Private key read from a file at load time.
    PrivateKey { key_file: PathBuf },
}

impl std::fmt::Debug for HostAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { .. } => f.write_str("Password"),
            Self::PrivateKey { key_file } => f
                .debug_struct("PrivateKey")
                .field("key_file", key_file)
                .finish(),
        }
    }
}

/// A job entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub id: JobId,
    pub name: String,
    pub spec: String,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    pub command: String,
    /// Seconds; 0 is unbounded, -1 runs in the background.
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub multi_exec: bool,
    #[serde(default)]
    pub retry_times: u8,
    #[serde(default)]
    pub host: Option<HostId>,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_protocol() -> Protocol {
    Protocol::Local
}

impl From<JobConfig> for Job {
    fn from(config: JobConfig) -> Self {
        let mut job = Job::new(config.id, config.name, config.spec, config.command)
            .with_protocol(config.protocol)
            .with_timeout_secs(config.timeout)
            .with_multi_exec(config.multi_exec)
            .with_retry_times(config.retry_times)
            .with_notify(config.notify)
            .with_enabled(config.enabled);
        if let Some(host) = config.host {
            job = job.with_host(host);
        }
        job
    }
}
