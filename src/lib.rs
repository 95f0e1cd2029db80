//! jobwarden - cron-style job scheduling with guarded, retried firings.
//!
//! Jobs run a shell command locally, a command on a remote host, or an HTTP
//! GET. Each firing goes through one pipeline: an overlap guard, an
//! execution record, retries with linear backoff, and a notification.
//!
//! # Example
//!
//! ```no_run
//! use jobwarden::{
//!     EngineContext, HandlerRegistry, InMemoryHostStore, InMemoryRepository, Job, LogNotifier,
//!     Scheduler,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = Arc::new(InMemoryRepository::with_jobs([Job::new(
//!     1,
//!     "rotate-logs",
//!     "0 */5 * * * *",
//!     "logrotate /etc/logrotate.conf",
//! )])?);
//! let ctx = Arc::new(EngineContext::new(repository, Arc::new(LogNotifier)));
//! let handlers = HandlerRegistry::standard(Arc::new(InMemoryHostStore::new()))?;
//!
//! let (handle, _task) = Scheduler::new(ctx).with_handlers(handlers).start();
//! handle.load_enabled().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod handlers;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use config::{ConfigError, LoadedConfig, YamlLoader};
pub use core::host::{
    AuthType, ConnectionParams, Host, HostError, HostStore, InMemoryHostStore, ResolvedHost,
};
pub use core::job::{Job, JobError, NotifyChannel, NotifyPolicy, NotifySettings, Protocol};
pub use core::record::{ExecutionRecord, ExecutionResult, ExecutionStatus, LogUpdate};
pub use core::retry::RetryPolicy;
pub use core::schedule::{Schedule, ScheduleError};
pub use core::types::{HostId, JobId, LogId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    EngineContext, ExecutionCounter, FiringReport, Pipeline, RunGuard, ShellDialect,
    Trigger,
};
pub use handlers::{
    Handler, HandlerError, HandlerOutcome, HandlerRegistry, HttpHandler, LocalHandler,
    RemoteHandler, RemoteTransport, ReqwestHttpClient, SshCommandTransport,
};
pub use notify::{ChannelNotifier, LogNotifier, NotificationSink, NotifyMessage, StatusLabel};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState, SchedulingError};
pub use storage::{InMemoryRepository, JobRepository, RepositoryError};
