//! Configuration loading and parsing.
//!
//! This module provides the YAML file that describes settings, hosts and jobs.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{ConfigFile, HostAuthConfig, HostConfig, JobConfig, Settings};
pub use yaml::{LoadedConfig, YamlLoader};
