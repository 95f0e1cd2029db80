//! Scheduler engine implementation.
//!
//! The scheduler owns the timer loop and the registry of job pipelines. It
//! is responsible for:
//! - Firing registered jobs when their cron spec comes due
//! - Adding, replacing and removing registrations at runtime
//! - Manual runs, dispatched as independent tasks
//! - Stopping the timer without waiting for in-flight firings

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::types::{SchedulerCommand, SchedulerState, SchedulingError};
use crate::core::job::Job;
use crate::core::schedule::Schedule;
use crate::core::types::JobId;
use crate::execution::{EngineContext, Pipeline, Trigger};
use crate::handlers::HandlerRegistry;

/// Upper bound on occurrences counted between two ticks.
const MAX_COUNT_ITERATIONS: usize = 100;

/// Default bound on how long `shutdown` waits for in-flight firings.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct Entry {
    pipeline: Arc<Pipeline>,
    schedule: Schedule,
    /// Next occurrence to fire; `None` once the spec has no more.
    next_due: Option<DateTime<Utc>>,
}

/// Main scheduler for job firings.
pub struct Scheduler {
    ctx: Arc<EngineContext>,
    handlers: HandlerRegistry,
    entries: HashMap<JobId, Entry>,
    tick_interval: Duration,
    timezone: Tz,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Create a scheduler over `ctx` with no handlers registered.
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            handlers: HandlerRegistry::new(),
            entries: HashMap::new(),
            tick_interval: Duration::from_secs(1),
            timezone: Tz::UTC,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the handler registry used to build pipelines.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the timezone cron specs are evaluated in.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the default drain bound used by [`SchedulerHandle::shutdown_default`].
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the timer loop and return a handle for controlling it.
    ///
    /// Consumes the scheduler, so the loop can only be started once.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
            ctx: Arc::clone(&self.ctx),
            shutdown_timeout: self.shutdown_timeout,
        };

        let scheduler_task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, scheduler_task)
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(tick_interval = ?self.tick_interval, timezone = %self.timezone, "Scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_schedules(Utc::now());
                }

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        tracing::info!("All scheduler handles dropped, stopping");
                        break;
                    };
                    match command {
                        SchedulerCommand::AddJob { job, response } => {
                            let _ = response.send(self.add_job(*job));
                        }
                        SchedulerCommand::RemoveJob { job_id, response } => {
                            let _ = response.send(self.remove_job(job_id));
                        }
                        SchedulerCommand::RunNow { job, response } => {
                            let _ = response.send(self.run_now(*job));
                        }
                        SchedulerCommand::ListJobs { response } => {
                            let mut ids: Vec<_> = self.entries.keys().copied().collect();
                            ids.sort();
                            let _ = response.send(ids);
                        }
                        SchedulerCommand::Stop { response } => {
                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }

        *state.write().await = SchedulerState::Stopped;
        tracing::info!(
            in_flight = self.ctx.in_flight(),
            "Scheduler stopped, in-flight firings continue"
        );
    }

    /// Build the pipeline and register `job`, replacing any previous entry.
    ///
    /// On error the previous registration stays removed.
    fn add_job(&mut self, job: Job) -> Result<(), SchedulingError> {
        let job_id = job.id;
        self.entries.remove(&job_id);

        let result = Schedule::parse_in(&job.spec, self.timezone)
            .map_err(|source| SchedulingError::InvalidSchedule { job_id, source })
            .and_then(|schedule| {
                let pipeline = Pipeline::build(job, &self.handlers, Arc::clone(&self.ctx))?;
                Ok((schedule, pipeline))
            });

        match result {
            Ok((schedule, pipeline)) => {
                let next_due = schedule.next_after(Utc::now()).ok();
                tracing::info!(job_id = %job_id, spec = %schedule.spec(), next_due = ?next_due, "Job registered");
                self.entries.insert(
                    job_id,
                    Entry {
                        pipeline: Arc::new(pipeline),
                        schedule,
                        next_due,
                    },
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to register job");
                Err(e)
            }
        }
    }

    fn remove_job(&mut self, job_id: JobId) -> bool {
        let removed = self.entries.remove(&job_id).is_some();
        if removed {
            tracing::info!(job_id = %job_id, "Job removed");
        }
        removed
    }

    /// Fire `job` once on its own task. Only acceptance is reported.
    fn run_now(&self, job: Job) -> Result<(), SchedulingError> {
        let job_id = job.id;
        let pipeline = Pipeline::build(job, &self.handlers, Arc::clone(&self.ctx)).inspect_err(
            |e| tracing::error!(job_id = %job_id, error = %e, "Failed to run job"),
        )?;
        tracing::info!(job_id = %job_id, "Manual run accepted");
        tokio::spawn(async move {
            pipeline.fire(Trigger::Manual).await;
        });
        Ok(())
    }

    /// Fire every entry whose next occurrence is due, then advance it past `now`.
    ///
    /// Several missed occurrences fire the job only once.
    fn check_schedules(&mut self, now: DateTime<Utc>) {
        for (job_id, entry) in self.entries.iter_mut() {
            let Some(due) = entry.next_due else {
                continue;
            };
            if now < due {
                continue;
            }

            let mut occurrence_count = 1;
            let mut last = due;
            while occurrence_count < MAX_COUNT_ITERATIONS {
                match entry.schedule.next_after(last) {
                    Ok(next) if next <= now => {
                        occurrence_count += 1;
                        last = next;
                    }
                    _ => break,
                }
            }
            // Interval specs stay anchored to their registration instant
            // unless the backlog was too long to walk.
            let resume_from = if occurrence_count >= MAX_COUNT_ITERATIONS {
                now
            } else {
                last
            };
            entry.next_due = entry.schedule.next_after(resume_from).ok();

            if occurrence_count >= MAX_COUNT_ITERATIONS {
                tracing::warn!(
                    job_id = %job_id,
                    first_due = %due,
                    now = %now,
                    missed_occurrences = format!("{}+", occurrence_count),
                    "Many scheduled occurrences missed ({}+), firing once",
                    MAX_COUNT_ITERATIONS
                );
            } else if occurrence_count > 1 {
                tracing::warn!(
                    job_id = %job_id,
                    first_due = %due,
                    now = %now,
                    missed_occurrences = occurrence_count,
                    "Multiple scheduled occurrences missed, firing once"
                );
            } else {
                tracing::debug!(job_id = %job_id, "Scheduled occurrence due");
            }

            let pipeline = Arc::clone(&entry.pipeline);
            tokio::spawn(async move {
                pipeline.fire(Trigger::Scheduled).await;
            });
        }
    }
}
