//! Remote execution over a session transport.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{Handler, HandlerError, HandlerOutcome};
use crate::core::host::{HostStore, ResolvedHost};
use crate::core::job::Job;
use crate::execution::env::ShellDialect;

/// Executes a command on a resolved host.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Run `command` on `host`, bounded by `timeout`.
    ///
    /// Failures still carry whatever output was collected.
    async fn exec(
        &self,
        host: &ResolvedHost,
        command: &str,
        timeout: Option<Duration>,
    ) -> HandlerOutcome;
}

/// Runs jobs on their host through a [`RemoteTransport`].
pub struct RemoteHandler {
    hosts: Arc<dyn HostStore>,
    transport: Arc<dyn RemoteTransport>,
}

impl RemoteHandler {
    pub fn new(hosts: Arc<dyn HostStore>, transport: Arc<dyn RemoteTransport>) -> Self {
        Self { hosts, transport }
    }
}

#[async_trait]
impl Handler for RemoteHandler {
    async fn run(&self, job: &Job) -> HandlerOutcome {
        if job.command.trim().is_empty() {
            return HandlerOutcome::failure("", HandlerError::EmptyCommand);
        }
        let Some(host_id) = job.host else {
            return HandlerOutcome::failure("", HandlerError::Host("job has no host".into()));
        };

        let host = match self.hosts.resolve(host_id).await {
            Ok(host) => host,
            Err(e) => {
                tracing::warn!(job_id = %job.id, host_id = %host_id, error = %e, "Failed to resolve host");
                return HandlerOutcome::failure("", HandlerError::Host(e.to_string()));
            }
        };

        self.transport.exec(&host, &job.command, job.timeout()).await
    }

    fn dialect(&self) -> Option<ShellDialect> {
        Some(ShellDialect::Posix)
    }
}
