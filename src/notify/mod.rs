//! Completion notifications.
//!
//! The pipeline builds a [`NotifyMessage`] when a job's notify policy asks
//! for one and pushes it to a [`NotificationSink`]. Delivery to mail, Slack
//! or webhooks happens outside the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::core::job::{Job, NotifyChannel};
use crate::core::types::JobId;

/// Human status label carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Success,
    Failure,
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLabel::Success => f.write_str("success"),
            StatusLabel::Failure => f.write_str("failure"),
        }
    }
}

/// A notification about one finished firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub job_id: JobId,
    /// Job name, used as the subject.
    pub name: String,
    pub status: StatusLabel,
    /// Result text, used as the body.
    pub output: String,
    pub channel: NotifyChannel,
    pub receivers: Vec<String>,
}

impl NotifyMessage {
    pub fn for_job(job: &Job, failed: bool, output: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            status: if failed {
                StatusLabel::Failure
            } else {
                StatusLabel::Success
            },
            output: output.into(),
            channel: job.notify.channel,
            receivers: job.notify.receivers.clone(),
        }
    }
}

/// Destination for notifications. Delivery is best-effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, message: NotifyMessage);
}

/// Sink that forwards messages to a channel drained by a delivery task.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<NotifyMessage>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its delivery task reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotifyMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn push(&self, message: NotifyMessage) {
        let job_id = message.job_id;
        if let Err(e) = self.tx.try_send(message) {
            tracing::warn!(job_id = %job_id, error = %e, "Dropping notification");
        }
    }
}

/// Sink that writes each message as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn push(&self, message: NotifyMessage) {
        tracing::info!(
            job_id = %message.job_id,
            name = %message.name,
            status = %message.status,
            channel = ?message.channel,
            receivers = ?message.receivers,
            "{}",
            message.output
        );
    }
}
