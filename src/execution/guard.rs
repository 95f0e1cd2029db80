//! Per-job running flags.
//!
//! Jobs that do not allow overlapping firings consult the guard before
//! making any attempt. A single mutex covers the whole map, so the timer and
//! a manual run racing on the same job id see a consistent view.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::JobId;

/// Mapping of job id to its running flag.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: Mutex<HashMap<JobId, bool>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a firing of `job_id` is currently marked running.
    pub fn is_running(&self, job_id: JobId) -> bool {
        self.running.lock().get(&job_id).copied().unwrap_or(false)
    }

    pub fn mark(&self, job_id: JobId) {
        self.running.lock().insert(job_id, true);
    }

    pub fn clear(&self, job_id: JobId) {
        self.running.lock().remove(&job_id);
    }

    /// Check and mark in one step.
    ///
    /// Returns `None` if the job is already running. The returned mark
    /// clears the flag when dropped.
    pub fn try_acquire(self: &Arc<Self>, job_id: JobId) -> Option<RunMark> {
        let mut running = self.running.lock();
        let flag = running.entry(job_id).or_insert(false);
        if *flag {
            return None;
        }
        *flag = true;
        Some(RunMark {
            guard: Arc::clone(self),
            job_id,
            released: false,
        })
    }
}

/// Scoped running flag returned by [`RunGuard::try_acquire`].
#[derive(Debug)]
pub struct RunMark {
    guard: Arc<RunGuard>,
    job_id: JobId,
    released: bool,
}

impl RunMark {
    /// Clear the flag now instead of at drop.
    pub fn release(mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        if !self.released {
            self.guard.clear(self.job_id);
            self.released = true;
        }
    }
}

impl Drop for RunMark {
    fn drop(&mut self) {
        self.clear();
    }
}
