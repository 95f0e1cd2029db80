//! Core domain types: jobs, schedules, retry policy, hosts and records.

pub mod host;
pub mod job;
pub mod record;
pub mod retry;
pub mod schedule;
pub mod types;
