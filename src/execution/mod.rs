//! Firing execution.
//!
//! This module holds the per-job pipeline together with the process-wide
//! state it shares: the run guard, the in-flight counter and the engine
//! context.

mod context;
mod counter;
pub mod env;
mod guard;
mod pipeline;

pub use context::{DEFAULT_BACKOFF_UNIT, EngineContext};
pub use counter::{ExecutionCounter, InFlight};
pub use env::{EnvError, ShellDialect, correlation_token, format_env_assignment};
pub use guard::{RunGuard, RunMark};
pub use pipeline::{FiringReport, Pipeline, Trigger};
