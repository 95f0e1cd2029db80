//! Retry policy for job firings.
//!
//! A firing makes one initial attempt plus up to `budget` retries. The pause
//! before retry `k` grows linearly: `unit * k`.

use std::time::Duration;

/// Largest retry budget a job may carry.
pub const MAX_RETRY_BUDGET: u8 = 10;

/// Retry policy for a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    budget: u8,
    /// Backoff step; the pause after attempt `k` is `unit * k`.
    unit: Duration,
}

impl RetryPolicy {
    /// Create a policy. The budget must not exceed [`MAX_RETRY_BUDGET`];
    /// `Job::validate` rejects jobs that do.
    pub fn new(budget: u8, unit: Duration) -> Self {
        debug_assert!(
            budget <= MAX_RETRY_BUDGET,
            "retry budget {budget} exceeds {MAX_RETRY_BUDGET}"
        );
        Self { budget, unit }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Retries allowed after the initial attempt.
    pub fn budget(&self) -> u8 {
        self.budget
    }

    /// Total attempts, including the initial one.
    pub fn max_attempts(&self) -> u32 {
        u32::from(self.budget) + 1
    }

    /// Whether another attempt follows once `attempts` have failed.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts()
    }

    /// Pause after the `attempt`-th failed attempt (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
