use anyhow::Result;
use cadence_core::error::CoreError;
use cadence_core::models::{NewRecurringEvent, RuleParams};
use cadence_core::repository::Repository;
use chrono::{Duration, Utc};
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::cli::{RuleIdArgs, SeriesCommand, SeriesCreateCommand, SeriesIdArgs, SeriesListCommand, SeriesSubcommand};
use crate::config::Config;
use crate::util::parse_datetime;
use crate::views::table::display_rules;

pub async fn series_command<R: Repository>(
    repository: &R,
    command: SeriesCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        SeriesSubcommand::Create(cmd) => create_command(repository, cmd, config).await,
        SeriesSubcommand::Show(args) => show_command(repository, args).await,
        SeriesSubcommand::Delete(args) => delete_command(repository, args).await,
        SeriesSubcommand::Pause(args) => set_active_command(repository, args, false).await,
        SeriesSubcommand::Resume(args) => set_active_command(repository, args, true).await,
        SeriesSubcommand::List(cmd) => list_command(repository, cmd).await,
    }
}

/// Parses a user-supplied RRULE and attaches `timezone`.
pub fn parse_rule(rrule: &str, timezone: &str) -> Result<RuleParams> {
    let mut params = rrule
        .parse::<RuleParams>()
        .map_err(|e| CoreError::InvalidRRule(e.to_string()))?;
    params.timezone = timezone.to_string();
    Ok(params)
}

async fn create_command<R: Repository>(
    repository: &R,
    command: SeriesCreateCommand,
    config: &Config,
) -> Result<()> {
    let timezone = command
        .timezone
        .clone()
        .unwrap_or_else(|| config.default_timezone.clone());
    let start_at = parse_datetime(&command.start, &timezone)?;
    let end_at = match &command.end {
        Some(end) => parse_datetime(end, &timezone)?,
        None => start_at + Duration::minutes(command.duration),
    };
    let recurrence = parse_rule(&command.rrule, &timezone)?;

    let created = repository
        .create_recurring_event(
            NewRecurringEvent {
                organization_id: command.organization,
                creator_id: command.actor.unwrap_or_else(Uuid::nil),
                name: command.name,
                description: command.description,
                location: command.location,
                all_day: command.all_day,
                is_public: !command.private,
                is_registerable: command.registerable,
                is_invite_only: command.invite_only,
                start_at,
                end_at,
                recurrence,
                seed_instances: !command.no_seed,
            },
            Utc::now(),
        )
        .await?;

    println!(
        "{} recurring event '{}'",
        "✓ Created".green(),
        created.template.name.cyan()
    );
    println!("Series ID: {}", created.rule.original_series_id.yellow());
    println!("Rule ID: {}", created.rule.id);
    println!("RRULE: {} ({})", created.rule.rrule.green(), created.rule.timezone);
    println!("Instances materialized: {}", created.seeded_instances.len());
    Ok(())
}

async fn show_command<R: Repository>(repository: &R, args: SeriesIdArgs) -> Result<()> {
    let rules = repository.find_series_rules(args.series).await?;
    if rules.is_empty() {
        return Err(CoreError::NotFound(format!("Series with id {} not found", args.series)).into());
    }

    println!("{}", "Series".blue().bold());
    println!("Series ID: {}", args.series.yellow());
    println!("Forks: {}", rules.len());
    let total_generated: u64 = rules.iter().map(|r| u64::from(r.generated_count)).sum();
    println!("Occurrences generated: {}", total_generated);
    println!();
    display_rules(&rules);
    Ok(())
}

async fn delete_command<R: Repository>(repository: &R, args: SeriesIdArgs) -> Result<()> {
    let deleted = repository.delete_series(args.series).await?;
    println!(
        "{} series {} ({} instances removed)",
        "✓ Deleted".green(),
        args.series,
        deleted
    );
    Ok(())
}

async fn set_active_command<R: Repository>(
    repository: &R,
    args: RuleIdArgs,
    active: bool,
) -> Result<()> {
    let rule = repository
        .set_rule_active(args.rule, active, Utc::now())
        .await?;
    let verb = if active { "✓ Resumed" } else { "✓ Paused" };
    println!("{} rule {} ({})", verb.green(), rule.id, rule.rrule);
    Ok(())
}

async fn list_command<R: Repository>(repository: &R, command: SeriesListCommand) -> Result<()> {
    let rules = repository
        .find_rules_for_organization(command.organization, !command.all)
        .await?;
    display_rules(&rules);
    Ok(())
}
