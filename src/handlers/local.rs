//! Local shell execution.
//!
//! Commands run through `bash -c` on Unix and `cmd /C` on Windows. The child
//! is killed if the job timeout elapses. `cmd` writes GBK on Chinese-locale
//! hosts, so Windows output is transcoded before it is stored.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

use super::{Handler, HandlerError, HandlerOutcome, combine_output};
use crate::core::job::Job;
use crate::execution::env::ShellDialect;

/// Output stored when GBK output cannot be transcoded.
pub const TRANSCODE_FAILED_PLACEHOLDER: &str = "command output transcoding failed (gbk to utf8)";

/// Decode GBK bytes, returning `None` on malformed input.
pub fn decode_gbk(bytes: &[u8]) -> Option<String> {
    encoding_rs::GBK
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Runs commands in the native shell.
#[derive(Debug, Clone)]
pub struct LocalHandler {
    dialect: ShellDialect,
}

impl LocalHandler {
    pub fn new() -> Self {
        Self {
            dialect: ShellDialect::native(),
        }
    }

    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = match self.dialect {
            ShellDialect::Posix => {
                let mut cmd = Command::new("bash");
                cmd.arg("-c");
                cmd
            }
            ShellDialect::WindowsCmd => {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C");
                cmd
            }
        };
        cmd.arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self.dialect {
            ShellDialect::Posix => Some(String::from_utf8_lossy(bytes).into_owned()),
            ShellDialect::WindowsCmd => decode_gbk(bytes),
        }
    }
}

impl Default for LocalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for LocalHandler {
    async fn run(&self, job: &Job) -> HandlerOutcome {
        if job.command.trim().is_empty() {
            return HandlerOutcome::failure("", HandlerError::EmptyCommand);
        }

        let child = match self.shell_command(&job.command).spawn() {
            Ok(child) => child,
            Err(e) => return HandlerOutcome::failure("", HandlerError::Spawn(e.to_string())),
        };

        let waited = match job.timeout() {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => return HandlerOutcome::failure("", HandlerError::Timeout(limit)),
            },
            None => child.wait_with_output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => return HandlerOutcome::failure("", HandlerError::Spawn(e.to_string())),
        };

        let error = (!output.status.success()).then(|| HandlerError::NonZeroExit {
            code: output.status.code(),
        });

        let text = match (self.decode(&output.stdout), self.decode(&output.stderr)) {
            (Some(stdout), Some(stderr)) => combine_output(stdout, &stderr),
            _ => {
                tracing::warn!(job_id = %job.id, "Command output is not valid GBK");
                TRANSCODE_FAILED_PLACEHOLDER.to_string()
            }
        };

        HandlerOutcome {
            output: text,
            error,
        }
    }

    fn dialect(&self) -> Option<ShellDialect> {
        Some(self.dialect)
    }
}
