//! YAML configuration loading.
//!
//! Parses settings, hosts and jobs from one file and enforces the
//! constraints the engine assumes of its inputs.

use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::types::{ConfigFile, HostAuthConfig, HostConfig, Settings};
use crate::core::host::{AuthType, ConnectionParams, Host, HostError, InMemoryHostStore};
use crate::core::job::Job;
use crate::core::schedule::Schedule;
use crate::core::types::JobId;
use crate::storage::{InMemoryRepository, RepositoryError};

/// A validated configuration, ready to seed the default adapters.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: Settings,
    pub timezone: Tz,
    pub hosts: Vec<Host>,
    pub jobs: Vec<Job>,
}

impl LoadedConfig {
    /// Look up a job by id.
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Repository seeded with every job, enabled or not.
    pub fn repository(&self) -> Result<InMemoryRepository, RepositoryError> {
        InMemoryRepository::with_jobs(self.jobs.iter().cloned())
    }

    /// Host store seeded with every host.
    pub fn host_store(&self) -> Result<InMemoryHostStore, HostError> {
        let store = InMemoryHostStore::new();
        for host in &self.hosts {
            store.insert(host.clone())?;
        }
        Ok(store)
    }
}

/// Loader for YAML configuration files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// Private key files referenced by hosts are read here.
    pub fn parse(yaml: &str) -> Result<LoadedConfig, ConfigError> {
        let config: ConfigFile = serde_yaml::from_str(yaml)?;
        let timezone = Self::validate(&config)?;

        let hosts = config
            .hosts
            .into_iter()
            .map(Self::resolve_host)
            .collect::<Result<Vec<_>, _>>()?;
        let jobs = config.jobs.into_iter().map(Job::from).collect();

        Ok(LoadedConfig {
            settings: config.settings,
            timezone,
            hosts,
            jobs,
        })
    }

    /// Validate a parsed file, returning the schedule timezone.
    fn validate(config: &ConfigFile) -> Result<Tz, ConfigError> {
        let settings = &config.settings;
        let timezone = settings.tz().ok_or_else(|| {
            ConfigError::InvalidConfig(format!("unknown timezone '{}'", settings.timezone))
        })?;
        if settings.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms cannot be zero".into(),
            ));
        }

        let mut host_ids = HashSet::new();
        for host in &config.hosts {
            if !host_ids.insert(host.id) {
                return Err(ConfigError::DuplicateHost(host.id));
            }
            if host.name.trim().is_empty() || host.username.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "host {} needs a name and a username",
                    host.id
                )));
            }
        }

        let mut job_ids = HashSet::new();
        for entry in &config.jobs {
            if !job_ids.insert(entry.id) {
                return Err(ConfigError::DuplicateJob(entry.id));
            }

            let job = Job::from(entry.clone());
            job.validate()?;

            if let Some(host) = job.host.filter(|host| !host_ids.contains(host)) {
                return Err(ConfigError::UnknownHost {
                    job_id: job.id,
                    host,
                });
            }

            Schedule::parse_in(&job.spec, timezone).map_err(|source| {
                ConfigError::InvalidSchedule {
                    job_id: job.id,
                    source,
                }
            })?;
        }

        Ok(timezone)
    }

    fn resolve_host(config: HostConfig) -> Result<Host, ConfigError> {
        let (auth_type, secret) = match config.auth {
            HostAuthConfig::Password { password } => (AuthType::Password, password),
            HostAuthConfig::PrivateKey { key_file } => {
                let key = std::fs::read_to_string(&key_file).map_err(|source| {
                    ConfigError::FileReadError {
                        path: key_file.clone(),
                        source,
                    }
                })?;
                (AuthType::PrivateKey, key)
            }
        };

        Ok(Host {
            id: config.id,
            params: ConnectionParams {
                host: config.name,
                port: config.port,
                username: config.username,
            },
            auth_type,
            secret,
        })
    }
}
