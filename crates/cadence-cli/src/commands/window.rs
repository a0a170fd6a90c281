use anyhow::Result;
use cadence_core::error::CoreError;
use cadence_core::models::WindowConfigUpdate;
use cadence_core::repository::Repository;
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::cli::{WindowCommand, WindowDueCommand, WindowOrgArgs, WindowSetCommand, WindowSubcommand};
use crate::config::Config;
use crate::views::table::{display_due_windows, display_window};

pub async fn window_command<R: Repository>(
    repository: &R,
    command: WindowCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        WindowSubcommand::Show(args) => show_command(repository, args).await,
        WindowSubcommand::Init(args) => init_command(repository, args, config).await,
        WindowSubcommand::Set(cmd) => set_command(repository, cmd).await,
        WindowSubcommand::Cleanup(args) => cleanup_command(repository, args).await,
        WindowSubcommand::Prune(args) => prune_command(repository, args).await,
        WindowSubcommand::Due(cmd) => due_command(repository, cmd).await,
    }
}

async fn show_command<R: Repository>(repository: &R, args: WindowOrgArgs) -> Result<()> {
    let window = repository
        .find_window_config(args.organization)
        .await?
        .ok_or_else(|| {
            CoreError::NotFound(format!(
                "No window configuration for organization {}",
                args.organization
            ))
        })?;
    display_window(&window);
    Ok(())
}

async fn init_command<R: Repository>(
    repository: &R,
    args: WindowOrgArgs,
    config: &Config,
) -> Result<()> {
    let window = repository
        .initialize_window(args.organization, &config.window_defaults, Utc::now())
        .await?;
    println!("{} window for {}", "✓ Initialized".green(), args.organization);
    display_window(&window);
    Ok(())
}

async fn set_command<R: Repository>(repository: &R, command: WindowSetCommand) -> Result<()> {
    let update = WindowConfigUpdate {
        hot_window_months_ahead: command.hot_months,
        history_retention_months: command.retention_months,
        processing_priority: command.priority,
        max_instances_per_run: command.max_instances,
        is_enabled: match (command.enable, command.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
    };
    if update == WindowConfigUpdate::default() {
        println!("Nothing to update.");
        return Ok(());
    }

    let window = repository
        .update_window_config(command.organization, update, Utc::now())
        .await?;
    println!("{} window for {}", "✓ Updated".green(), command.organization);
    display_window(&window);
    Ok(())
}

async fn cleanup_command<R: Repository>(repository: &R, args: WindowOrgArgs) -> Result<()> {
    let status = repository
        .cleanup_status(args.organization, Utc::now())
        .await?;
    println!("{}", "Cleanup status".blue().bold());
    println!("Organization: {}", status.organization_id.yellow());
    println!("Total instances: {}", status.total_instances);
    println!(
        "Eligible for cleanup: {}",
        if status.eligible_for_cleanup > 0 {
            status.eligible_for_cleanup.yellow().to_string()
        } else {
            status.eligible_for_cleanup.to_string()
        }
    );
    println!(
        "Retention cutoff: {} ({} months)",
        status.retention_cutoff.format("%Y-%m-%d %H:%M UTC"),
        status.history_retention_months
    );
    println!(
        "Retained since: {}",
        status.retention_start_date.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

async fn prune_command<R: Repository>(repository: &R, args: WindowOrgArgs) -> Result<()> {
    let outcome = repository
        .prune_window(args.organization, Utc::now())
        .await?;
    println!(
        "{} {} instances; history now starts {}",
        "✓ Pruned".green(),
        outcome.instances_deleted,
        outcome.retention_start_date.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

async fn due_command<R: Repository>(repository: &R, command: WindowDueCommand) -> Result<()> {
    let windows = repository
        .find_due_windows(command.limit, Utc::now())
        .await?;
    display_due_windows(&windows);
    Ok(())
}
