//! Remote transport backed by the system `ssh` client.
//!
//! Private keys are written to a temporary file that lives as long as the
//! session. Password hosts go through `sshpass -e`, which reads the secret
//! from `SSHPASS` so it never appears on a command line.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;

use super::remote::RemoteTransport;
use super::{HandlerError, HandlerOutcome, combine_output};
use crate::core::host::{AuthType, ResolvedHost};

/// Exit status `ssh` uses for its own connection errors.
const SSH_CONNECTION_ERROR: i32 = 255;

/// [`RemoteTransport`] that shells out to `ssh`.
#[derive(Debug, Clone)]
pub struct SshCommandTransport {
    ssh_program: PathBuf,
    sshpass_program: PathBuf,
    connect_timeout: Duration,
}

impl SshCommandTransport {
    pub fn new() -> Self {
        Self {
            ssh_program: PathBuf::from("ssh"),
            sshpass_program: PathBuf::from("sshpass"),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_ssh_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn with_sshpass_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.sshpass_program = program.into();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn build_command(&self, host: &ResolvedHost, command: &str, key_file: Option<&Path>) -> Command {
        let mut cmd = match host.auth_type {
            AuthType::Password => {
                let mut cmd = Command::new(&self.sshpass_program);
                cmd.arg("-e").arg(&self.ssh_program).env("SSHPASS", &host.secret);
                cmd
            }
            AuthType::PrivateKey => {
                let mut cmd = Command::new(&self.ssh_program);
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };

        if let Some(path) = key_file {
            cmd.arg("-i").arg(path).arg("-o").arg("IdentitiesOnly=yes");
        }

        cmd.arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .arg("-p")
            .arg(host.params.port.to_string())
            .arg(format!("{}@{}", host.params.username, host.params.host))
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for SshCommandTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn write_key_file(secret: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(secret.as_bytes())?;
    if !secret.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl RemoteTransport for SshCommandTransport {
    async fn exec(
        &self,
        host: &ResolvedHost,
        command: &str,
        limit: Option<Duration>,
    ) -> HandlerOutcome {
        // Removed from disk when dropped at the end of this call.
        let key_file = match host.auth_type {
            AuthType::PrivateKey => match write_key_file(&host.secret) {
                Ok(file) => Some(file),
                Err(e) => {
                    return HandlerOutcome::failure(
                        "",
                        HandlerError::Transport(format!("failed to write key file: {e}")),
                    );
                }
            },
            AuthType::Password => None,
        };

        let mut cmd = self.build_command(host, command, key_file.as_ref().map(|f| f.path()));
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return HandlerOutcome::failure("", HandlerError::Spawn(e.to_string())),
        };

        let waited = match limit {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => return HandlerOutcome::failure("", HandlerError::Timeout(limit)),
            },
            None => child.wait_with_output().await,
        };
        let output = match waited {
            Ok(output) => output,
            Err(e) => return HandlerOutcome::failure("", HandlerError::Transport(e.to_string())),
        };

        let text = combine_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            &String::from_utf8_lossy(&output.stderr),
        );
        let error = match output.status.code() {
            _ if output.status.success() => None,
            Some(SSH_CONNECTION_ERROR) => Some(HandlerError::Transport(format!(
                "ssh session to {} failed",
                host.params
            ))),
            code => Some(HandlerError::NonZeroExit { code }),
        };
        HandlerOutcome {
            output: text,
            error,
        }
    }
}
