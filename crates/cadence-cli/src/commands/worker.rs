use anyhow::Result;
use cadence_core::repository::SqliteRepository;
use cadence_core::worker::{MaterializationSummary, MaterializationWorker};
use chrono::{SubsecRound, Utc};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::{WorkerCommand, WorkerRunCommand, WorkerSubcommand, WorkerTickCommand};
use crate::config::Config;
use crate::util::parse_datetime;

pub async fn worker_command(
    repository: Arc<SqliteRepository>,
    command: WorkerCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        WorkerSubcommand::Run(cmd) => run_command(repository, cmd, config).await,
        WorkerSubcommand::Tick(cmd) => tick_command(repository, cmd, config).await,
    }
}

async fn run_command(
    repository: Arc<SqliteRepository>,
    command: WorkerRunCommand,
    config: &Config,
) -> Result<()> {
    let mut worker_config = config.worker.to_worker_config();
    if let Some(interval) = command.interval {
        worker_config = worker_config.with_tick_interval(Duration::from_secs(interval.max(1)));
    }
    if let Some(worker_id) = command.worker_id {
        worker_config = worker_config.with_worker_id(worker_id);
    }

    let worker = MaterializationWorker::new(repository, worker_config);
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current tick");
            shutdown.cancel();
        }
    });

    println!(
        "{} worker {} (every {}s, Ctrl-C to stop)",
        "Starting".green().bold(),
        worker.config().worker_id.cyan(),
        worker.config().tick_interval.as_secs()
    );
    worker.run(cancel).await;
    println!("Worker stopped.");
    Ok(())
}

async fn tick_command(
    repository: Arc<SqliteRepository>,
    command: WorkerTickCommand,
    config: &Config,
) -> Result<()> {
    let now = match &command.at {
        Some(at) => parse_datetime(at, &config.default_timezone)?,
        None => Utc::now().trunc_subsecs(0),
    };
    let worker = MaterializationWorker::new(repository, config.worker.to_worker_config());

    let summary = if command.no_prune {
        worker.tick(now).await?
    } else {
        worker.run_once(now).await?
    };
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &MaterializationSummary) {
    println!("{}", "Materialization tick".blue().bold());
    println!(
        "Organizations: {} processed, {} skipped, {} failed",
        summary.organizations_processed.green(),
        summary.organizations_skipped.yellow(),
        if summary.organizations_failed > 0 {
            summary.organizations_failed.red().to_string()
        } else {
            summary.organizations_failed.to_string()
        }
    );
    println!("Instances created: {}", summary.instances_created);
    println!("Instances pruned: {}", summary.instances_pruned);
    println!("Duration: {}ms", summary.duration_ms);
    for error in &summary.errors {
        println!("  {} {}", "✗".red(), error);
    }
}
