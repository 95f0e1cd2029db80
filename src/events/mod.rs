//! Firing lifecycle events and event handling.
//!
//! The pipeline emits an [`Event`] at each step of a firing so callers can
//! observe admission, retries and completion without reading the repository.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::record::ExecutionStatus;
use crate::core::types::{JobId, LogId};

/// Lifecycle events emitted during a firing.
#[derive(Debug, Clone)]
pub enum Event {
    /// The firing was admitted and its record created.
    FiringStarted {
        job_id: JobId,
        log_id: LogId,
        timestamp: Instant,
    },

    /// The firing overlapped a running one and was cancelled.
    FiringRejected { job_id: JobId, timestamp: Instant },

    /// An attempt failed and another one will follow.
    ///
    /// Emitted immediately before the backoff sleep.
    AttemptFailed {
        job_id: JobId,
        /// The attempt number that just failed (1-indexed).
        attempt: u32,
        /// Total attempts, including the initial one.
        max_attempts: u32,
        error: String,
        retry_in: Duration,
        timestamp: Instant,
    },

    /// The firing reached a terminal status.
    FiringCompleted {
        job_id: JobId,
        log_id: LogId,
        status: ExecutionStatus,
        retries_used: u8,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::FiringStarted { timestamp, .. } => *timestamp,
            Event::FiringRejected { timestamp, .. } => *timestamp,
            Event::AttemptFailed { timestamp, .. } => *timestamp,
            Event::FiringCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Job the event belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            Event::FiringStarted { job_id, .. }
            | Event::FiringRejected { job_id, .. }
            | Event::AttemptFailed { job_id, .. }
            | Event::FiringCompleted { job_id, .. } => *job_id,
        }
    }

    pub fn firing_started(job_id: JobId, log_id: LogId) -> Self {
        Event::FiringStarted {
            job_id,
            log_id,
            timestamp: Instant::now(),
        }
    }

    pub fn firing_rejected(job_id: JobId) -> Self {
        Event::FiringRejected {
            job_id,
            timestamp: Instant::now(),
        }
    }

    pub fn attempt_failed(
        job_id: JobId,
        attempt: u32,
        max_attempts: u32,
        error: String,
        retry_in: Duration,
    ) -> Self {
        Event::AttemptFailed {
            job_id,
            attempt,
            max_attempts,
            error,
            retry_in,
            timestamp: Instant::now(),
        }
    }

    pub fn firing_completed(
        job_id: JobId,
        log_id: LogId,
        status: ExecutionStatus,
        retries_used: u8,
        duration: Duration,
    ) -> Self {
        Event::FiringCompleted {
            job_id,
            log_id,
            status,
            retries_used,
            duration,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        async fn events(&self) -> Vec<Event> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) {
            self.events.lock().await.push(event.clone());
        }
    }

    struct CountingHandler {
        count: AtomicU32,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_emit_attempt_failed_event() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        bus.emit(Event::attempt_failed(
            JobId::new(4),
            1,
            3,
            "exit status 1".into(),
            Duration::from_secs(60),
        ))
        .await;

        let events = handler.events().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::AttemptFailed {
                job_id,
                attempt,
                max_attempts,
                retry_in,
                ..
            } => {
                assert_eq!(*job_id, JobId::new(4));
                assert_eq!(*attempt, 1);
                assert_eq!(*max_attempts, 3);
                assert_eq!(*retry_in, Duration::from_secs(60));
            }
            _ => panic!("Expected AttemptFailed event"),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let handler = Arc::new(RecordingHandler::new());
        let bus = EventBus::new();
        bus.register(handler.clone()).await;

        let job_id = JobId::new(1);
        let log_id = LogId::new(1);
        bus.emit(Event::firing_started(job_id, log_id)).await;
        bus.emit(Event::firing_completed(
            job_id,
            log_id,
            ExecutionStatus::Finished,
            0,
            Duration::from_millis(5),
        ))
        .await;
        bus.emit(Event::firing_rejected(job_id)).await;

        let events = handler.events().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Event::FiringStarted { .. }));
        assert!(matches!(events[1], Event::FiringCompleted { .. }));
        assert!(matches!(events[2], Event::FiringRejected { .. }));
        assert!(events.iter().all(|e| e.job_id() == job_id));
    }

    #[tokio::test]
    async fn test_multiple_handlers_receive_same_event() {
        let first = Arc::new(CountingHandler {
            count: AtomicU32::new(0),
        });
        let second = Arc::new(CountingHandler {
            count: AtomicU32::new(0),
        });

        let bus = EventBus::new();
        bus.register(first.clone()).await;
        bus.register(second.clone()).await;
        assert_eq!(bus.handler_count().await, 2);

        bus.emit(Event::firing_rejected(JobId::new(1))).await;
        assert_eq!(first.count.load(Ordering::SeqCst), 1);
        assert_eq!(second.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_handlers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(Event::firing_rejected(JobId::new(1))).await;
    }

    #[test]
    fn test_event_timestamps_are_accurate() {
        let before = Instant::now();
        let event = Event::firing_rejected(JobId::new(1));
        let after = Instant::now();

        assert!(event.timestamp() >= before);
        assert!(event.timestamp() <= after);
    }
}
