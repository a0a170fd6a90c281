use anyhow::Result;
use cadence_core::error::CoreError;
use cadence_core::models::{EditOutcome, EditScope, InstanceEdit, InstanceOverrides};
use cadence_core::query::InstanceQuery;
use cadence_core::repository::Repository;
use chrono::{Duration, Utc};
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::cli::{
    InstanceActorArgs, InstanceEditCommand, InstanceShowCommand, InstancesCommand,
    InstancesListCommand, InstancesSubcommand,
};
use crate::commands::series::parse_rule;
use crate::config::Config;
use crate::util::parse_datetime;
use crate::views::table::{display_instance, display_instances};

pub async fn instances_command<R: Repository>(
    repository: &R,
    command: InstancesCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        InstancesSubcommand::List(cmd) => list_command(repository, cmd, config).await,
        InstancesSubcommand::Show(cmd) => show_command(repository, cmd, config).await,
        InstancesSubcommand::Edit(cmd) => edit_command(repository, cmd, config).await,
        InstancesSubcommand::Cancel(args) => cancel_command(repository, args, config).await,
        InstancesSubcommand::Restore(args) => restore_command(repository, args, config).await,
    }
}

async fn list_command<R: Repository>(
    repository: &R,
    command: InstancesListCommand,
    config: &Config,
) -> Result<()> {
    let timezone = command
        .timezone
        .clone()
        .unwrap_or_else(|| config.default_timezone.clone());
    let from = match &command.from {
        Some(from) => parse_datetime(from, &timezone)?,
        None => Utc::now(),
    };
    let to = match &command.to {
        Some(to) => parse_datetime(to, &timezone)?,
        None => from + Duration::days(command.days),
    };
    if to <= from {
        return Err(CoreError::Validation("range end must be after its start".into()).into());
    }

    let mut query =
        InstanceQuery::new(command.organization, from, to).include_cancelled(command.include_cancelled);
    if let Some(limit) = command.limit {
        query = query.limit(limit);
    }
    let instances = repository.find_instances(&query).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
    } else {
        display_instances(&instances, &timezone);
    }
    Ok(())
}

async fn show_command<R: Repository>(
    repository: &R,
    command: InstanceShowCommand,
    config: &Config,
) -> Result<()> {
    let instance = repository
        .find_instance(command.organization, command.id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Instance with id {} not found", command.id)))?;
    let position = repository.series_position(instance.id).await?;

    display_instance(&instance, &config.default_timezone);
    match position.total {
        Some(total) => println!("Occurrence {} of {}", position.position, total),
        None => println!("Occurrence {}", position.position),
    }
    Ok(())
}

fn overrides_from(command: &InstanceEditCommand, timezone: &str) -> Result<InstanceOverrides> {
    let description = if command.description_clear {
        Some(None)
    } else {
        command.description.clone().map(Some)
    };
    let location = if command.location_clear {
        Some(None)
    } else {
        command.location.clone().map(Some)
    };

    Ok(InstanceOverrides {
        name: command.name.clone(),
        description,
        location,
        start_at: command
            .start
            .as_deref()
            .map(|s| parse_datetime(s, timezone))
            .transpose()?,
        end_at: command
            .end
            .as_deref()
            .map(|s| parse_datetime(s, timezone))
            .transpose()?,
        ..Default::default()
    })
}

async fn edit_command<R: Repository>(
    repository: &R,
    command: InstanceEditCommand,
    config: &Config,
) -> Result<()> {
    let timezone = command
        .timezone
        .clone()
        .unwrap_or_else(|| config.default_timezone.clone());
    let overrides = overrides_from(&command, &timezone)?;
    let recurrence = command
        .rrule
        .as_deref()
        .map(|rrule| parse_rule(rrule, &timezone))
        .transpose()?;
    if overrides.is_empty() && recurrence.is_none() {
        println!("Nothing to update.");
        return Ok(());
    }

    let scope = EditScope::from(command.scope);
    let outcome = repository
        .edit_instance(
            command.id,
            InstanceEdit {
                overrides,
                recurrence,
            },
            scope,
            command.actor.unwrap_or_else(Uuid::nil),
            Utc::now(),
        )
        .await?;

    match outcome {
        EditOutcome::Instance(instance) => {
            println!("{} instance {}", "✓ Updated".green(), instance.id);
            display_instance(&instance, &timezone);
        }
        EditOutcome::Split(split) => {
            println!(
                "{} series from occurrence onward: {} instances replaced, {} created",
                "✓ Split".green(),
                split.instances_removed,
                split.seeded_instances.len()
            );
            println!("New rule: {} ({})", split.rule.id.yellow(), split.rule.rrule.green());
        }
        EditOutcome::Series(templates) => {
            println!(
                "{} {} template(s) of the series",
                "✓ Updated".green(),
                templates.len()
            );
        }
    }
    Ok(())
}

async fn cancel_command<R: Repository>(
    repository: &R,
    args: InstanceActorArgs,
    config: &Config,
) -> Result<()> {
    let instance = repository
        .cancel_instance(args.id, args.actor.unwrap_or_else(Uuid::nil), Utc::now())
        .await?;
    println!("{} instance {}", "✓ Cancelled".green(), instance.id);
    display_instance(&instance, &config.default_timezone);
    Ok(())
}

async fn restore_command<R: Repository>(
    repository: &R,
    args: InstanceActorArgs,
    config: &Config,
) -> Result<()> {
    let instance = repository
        .update_instance(
            args.id,
            InstanceOverrides {
                is_cancelled: Some(false),
                ..Default::default()
            },
            args.actor.unwrap_or_else(Uuid::nil),
            Utc::now(),
        )
        .await?;
    println!("{} instance {}", "✓ Restored".green(), instance.id);
    display_instance(&instance, &config.default_timezone);
    Ok(())
}
