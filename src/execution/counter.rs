//! Global count of in-flight firings.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic counter of firings currently inside the pipeline.
///
/// Observability only; admission never consults it.
#[derive(Debug, Default)]
pub struct ExecutionCounter {
    value: AtomicUsize,
}

impl ExecutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement, saturating at zero.
    pub fn decrement(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::SeqCst)
    }

    /// Increment now and decrement when the returned guard drops.
    pub fn enter(self: &Arc<Self>) -> InFlight {
        self.increment();
        InFlight {
            counter: Arc::clone(self),
        }
    }
}

/// Scoped in-flight registration returned by [`ExecutionCounter::enter`].
#[derive(Debug)]
pub struct InFlight {
    counter: Arc<ExecutionCounter>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
