//! Protocol-specific execution strategies.
//!
//! A [`Handler`] runs one attempt of a job and returns its output together
//! with an optional error. The [`HandlerRegistry`] maps each [`Protocol`] to
//! the handler used for it; jobs whose protocol has no entry are never
//! scheduled.

mod http;
mod local;
mod remote;
mod ssh;

pub use http::{HttpClient, HttpHandler, HttpResponse, ReqwestHttpClient};
pub use local::{LocalHandler, TRANSCODE_FAILED_PLACEHOLDER, decode_gbk};
pub use remote::{RemoteHandler, RemoteTransport};
pub use ssh::SshCommandTransport;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::host::HostStore;
use crate::core::job::{Job, Protocol};
use crate::execution::env::ShellDialect;

/// Errors from a single attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Nothing to run.
    #[error("command is empty")]
    EmptyCommand,

    /// The process could not be started.
    #[error("failed to start command: {0}")]
    Spawn(String),

    /// The process exited unsuccessfully.
    #[error("exit status {}", exit_label(.code))]
    NonZeroExit { code: Option<i32> },

    /// The attempt exceeded the job timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP response status other than 200.
    #[error("http status {0}")]
    HttpStatus(u16),

    /// Remote session or HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Host could not be resolved.
    #[error("host resolution failed: {0}")]
    Host(String),

    /// The attempt panicked.
    #[error("attempt panicked: {0}")]
    Panicked(String),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl HandlerError {
    /// Whether the error came from a transport rather than the command.
    pub fn is_transport(&self) -> bool {
        matches!(self, HandlerError::Transport(_) | HandlerError::Host(_))
    }
}

/// Output and error of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub output: String,
    pub error: Option<HandlerError>,
}

impl HandlerOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(output: impl Into<String>, error: HandlerError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs one attempt of a job.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run `job.command` once, bounded by the job timeout.
    async fn run(&self, job: &Job) -> HandlerOutcome;

    /// Shell the command is interpreted by; `None` when there is no shell.
    fn dialect(&self) -> Option<ShellDialect>;
}

/// Lookup table from protocol to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Protocol, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `protocol`, replacing any previous one.
    pub fn with_handler(mut self, protocol: Protocol, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(protocol, handler);
        self
    }

    /// Registry with the local handler, the ssh transport over `hosts`, and
    /// the reqwest client.
    pub fn standard(hosts: Arc<dyn HostStore>) -> Result<Self, reqwest::Error> {
        let http = ReqwestHttpClient::new()?;
        Ok(Self::new()
            .with_handler(Protocol::Local, Arc::new(LocalHandler::new()))
            .with_handler(
                Protocol::Remote,
                Arc::new(RemoteHandler::new(hosts, Arc::new(SshCommandTransport::new()))),
            )
            .with_handler(Protocol::Http, Arc::new(HttpHandler::new(Arc::new(http)))))
    }

    /// Handler for `protocol`, if one is registered.
    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&protocol).cloned()
    }

    pub fn contains(&self, protocol: Protocol) -> bool {
        self.handlers.contains_key(&protocol)
    }
}

/// Join stdout and stderr into one output string, stdout first.
pub(crate) fn combine_output(stdout: String, stderr: &str) -> String {
    let mut output = stdout;
    output.push_str(stderr);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::InMemoryHostStore;

    #[test]
    fn test_error_descriptions() {
        assert_eq!(
            HandlerError::NonZeroExit { code: Some(2) }.to_string(),
            "exit status 2"
        );
        assert_eq!(
            HandlerError::NonZeroExit { code: None }.to_string(),
            "exit status signal"
        );
        assert_eq!(HandlerError::HttpStatus(404).to_string(), "http status 404");
        assert!(HandlerError::Host("gone".into()).is_transport());
        assert!(!HandlerError::EmptyCommand.is_transport());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new()
            .with_handler(Protocol::Local, Arc::new(LocalHandler::new()));

        assert!(registry.contains(Protocol::Local));
        assert!(registry.get(Protocol::Http).is_none());
    }

    #[test]
    fn test_standard_registry_covers_every_protocol() {
        let registry = HandlerRegistry::standard(Arc::new(InMemoryHostStore::new())).unwrap();

        for protocol in [Protocol::Local, Protocol::Remote, Protocol::Http] {
            assert!(registry.contains(protocol), "missing {protocol}");
        }
        assert_eq!(registry.get(Protocol::Http).unwrap().dialect(), None);
        assert_eq!(
            registry.get(Protocol::Remote).unwrap().dialect(),
            Some(ShellDialect::Posix)
        );
    }
}
