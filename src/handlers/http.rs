//! HTTP callout jobs.
//!
//! The job command is a URL fetched with GET. Any status other than 200 is
//! a failure whose output is the response body.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{Handler, HandlerError, HandlerOutcome};
use crate::core::job::Job;
use crate::execution::env::ShellDialect;

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal HTTP client used by [`HttpHandler`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url`, bounded by `timeout`.
    async fn get(&self, url: &str, timeout: Option<Duration>)
    -> Result<HttpResponse, HandlerError>;
}

/// [`HttpClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("jobwarden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HandlerError> {
        let mut request = self.client.get(url);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }

        let map_err = |e: reqwest::Error| match timeout {
            Some(limit) if e.is_timeout() => HandlerError::Timeout(limit),
            _ => HandlerError::Transport(e.to_string()),
        };

        let response = request.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;
        Ok(HttpResponse { status, body })
    }
}

/// Runs HTTP jobs through an [`HttpClient`].
pub struct HttpHandler {
    client: Arc<dyn HttpClient>,
}

impl HttpHandler {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Handler for HttpHandler {
    async fn run(&self, job: &Job) -> HandlerOutcome {
        let url = job.command.trim();
        if url.is_empty() {
            return HandlerOutcome::failure("", HandlerError::EmptyCommand);
        }

        match self.client.get(url, job.timeout()).await {
            Ok(response) if response.status == 200 => HandlerOutcome::success(response.body),
            Ok(response) => {
                HandlerOutcome::failure(response.body, HandlerError::HttpStatus(response.status))
            }
            Err(e) => HandlerOutcome::failure("", e),
        }
    }

    fn dialect(&self) -> Option<ShellDialect> {
        None
    }
}
