//! Scheduler facade.
//!
//! This module provides the timer loop that fires registered jobs and the
//! handle used to manage registrations while it runs.

mod engine;
mod handle;
mod types;

pub use engine::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler};
pub use handle::SchedulerHandle;
pub use types::{SchedulerState, SchedulingError};
