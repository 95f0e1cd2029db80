//! Process-wide engine state shared by every pipeline.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::counter::ExecutionCounter;
use super::guard::RunGuard;
use crate::events::EventBus;
use crate::notify::NotificationSink;
use crate::storage::JobRepository;

/// Default pause unit between retries; retry `k` waits `k` units.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(60);

/// Shared state of one engine instance.
///
/// Built once before the scheduler starts and shared by `Arc` between the
/// scheduler loop and every firing.
pub struct EngineContext {
    repository: Arc<dyn JobRepository>,
    notifier: Arc<dyn NotificationSink>,
    event_bus: Arc<EventBus>,
    guard: Arc<RunGuard>,
    counter: Arc<ExecutionCounter>,
    backoff_unit: Duration,
    shutdown: CancellationToken,
}

impl EngineContext {
    pub fn new(repository: Arc<dyn JobRepository>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            repository,
            notifier,
            event_bus: Arc::new(EventBus::new()),
            guard: Arc::new(RunGuard::new()),
            counter: Arc::new(ExecutionCounter::new()),
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use a shared event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Set the retry backoff unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn guard(&self) -> &Arc<RunGuard> {
        &self.guard
    }

    pub fn counter(&self) -> &Arc<ExecutionCounter> {
        &self.counter
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Firings currently inside the pipeline.
    pub fn in_flight(&self) -> usize {
        self.counter.value()
    }
}
