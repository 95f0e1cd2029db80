//! jw - command line front end for jobwarden.
//!
//! Usage:
//!   jw run <config>               Run the scheduler until Ctrl+C
//!   jw validate <config>          Validate a configuration file
//!   jw list <config>              List jobs and their next fire time
//!   jw trigger <config> <job-id>  Run one job now and print its record

use chrono::Utc;
use clap::{Parser, Subcommand};
use jobwarden::{
    EngineContext, Event, EventBus, EventHandler, ExecutionStatus, HandlerRegistry, JobId,
    JobRepository, LoadedConfig, LogNotifier, Pipeline, Schedule, Scheduler, Trigger, YamlLoader,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// jw - cron-style job scheduler
#[derive(Parser)]
#[command(name = "jw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with the jobs in a configuration file
    Run {
        /// Path to the YAML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Validate a configuration file without running
    Validate {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// List jobs with protocol, spec and next fire time
    List {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Run one job now and print its execution record
    Trigger {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Job ID to trigger
        #[arg(value_name = "JOB_ID")]
        job_id: u64,
    },
}

/// Event handler that logs firing lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::FiringStarted { job_id, log_id, .. } => {
                info!("Job {} started (log: {})", job_id, log_id);
            }
            Event::FiringRejected { job_id, .. } => {
                warn!("Job {} still running, firing cancelled", job_id);
            }
            Event::AttemptFailed {
                job_id,
                attempt,
                max_attempts,
                error,
                retry_in,
                ..
            } => {
                warn!(
                    "Job {} attempt {}/{} failed: {} (retry in {:?})",
                    job_id, attempt, max_attempts, error, retry_in
                );
            }
            Event::FiringCompleted {
                job_id,
                status,
                retries_used,
                duration,
                ..
            } => {
                info!(
                    "Job {} {} in {:?} ({} retries)",
                    job_id, status, duration, retries_used
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_scheduler(config).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::List { config } => list_jobs(config)?,
        Commands::Trigger { config, job_id } => trigger_job(config, JobId::new(job_id)).await?,
    }

    Ok(())
}

/// Build the engine context and handler registry described by `config`.
async fn build_engine(
    config: &LoadedConfig,
) -> Result<(Arc<EngineContext>, HandlerRegistry), Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let ctx = EngineContext::new(Arc::new(config.repository()?), Arc::new(LogNotifier))
        .with_event_bus(event_bus)
        .with_backoff_unit(config.settings.backoff_unit());
    let handlers = HandlerRegistry::standard(Arc::new(config.host_store()?))?;

    Ok((Arc::new(ctx), handlers))
}

/// Run the scheduler until Ctrl+C, then drain.
async fn run_scheduler(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());
    let config = YamlLoader::load(&path)?;
    let (ctx, handlers) = build_engine(&config).await?;

    let (handle, scheduler_task) = Scheduler::new(ctx)
        .with_handlers(handlers)
        .with_tick_interval(config.settings.tick_interval())
        .with_timezone(config.timezone)
        .with_shutdown_timeout(config.settings.shutdown_timeout())
        .start();

    let failures = handle.load_enabled().await?;
    for (job_id, e) in &failures {
        warn!(job_id = %job_id, error = %e, "Job not scheduled");
    }
    info!(
        "Scheduled {} job(s), press Ctrl+C to stop",
        handle.registered_jobs().await?.len()
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            if !handle.shutdown_default().await {
                warn!("{} firing(s) abandoned at shutdown", handle.in_flight());
            }
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    Ok(())
}

/// Validate a configuration file without running.
fn validate_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating: {}", path.display());

    match YamlLoader::load(&path) {
        Ok(config) => {
            info!(
                "Configuration is valid: {} host(s), {} job(s)",
                config.hosts.len(),
                config.jobs.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List all jobs in the configuration.
fn list_jobs(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load(&path)?;

    if config.jobs.is_empty() {
        println!("No jobs in {}", path.display());
        return Ok(());
    }

    let now = Utc::now();
    for job in &config.jobs {
        println!("ID: {}", job.id);
        println!("  Name: {}", job.name);
        println!("  Protocol: {}", job.protocol);
        println!("  Spec: {}", job.spec);
        println!("  Enabled: {}", job.enabled);
        let next = Schedule::parse_in(&job.spec, config.timezone)
            .and_then(|schedule| schedule.next_after(now));
        match next {
            Ok(at) => println!("  Next: {}", at.with_timezone(&config.timezone)),
            Err(e) => println!("  Next: {}", e),
        }
        println!();
    }

    Ok(())
}

/// Run a single job to completion and print its record.
async fn trigger_job(path: PathBuf, job_id: JobId) -> Result<(), Box<dyn std::error::Error>> {
    let config = YamlLoader::load(&path)?;

    let Some(job) = config.job(job_id).cloned() else {
        let available: Vec<String> = config.jobs.iter().map(|j| j.id.to_string()).collect();
        error!("Job {} not found, available: {}", job_id, available.join(", "));
        return Err(format!("job {} not found", job_id).into());
    };

    let (ctx, handlers) = build_engine(&config).await?;
    let pipeline = Pipeline::build(job, &handlers, Arc::clone(&ctx))?;

    info!("Triggering job {}...", job_id);
    let report = pipeline.fire(Trigger::Manual).await;

    let Some(log_id) = report.log_id else {
        return Err(format!("job {} produced no execution record", job_id).into());
    };
    for (id, record) in ctx.repository().list_logs(job_id, 1).await? {
        if id == log_id {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    if report.status == ExecutionStatus::Failed {
        return Err(format!("job {} finished with status {}", job_id, report.status).into());
    }
    Ok(())
}
