use cadence_core::db;
use cadence_core::error::CoreError;
use cadence_core::repository::SqliteRepository;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Invalid configuration: {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.log_filter);
    if let Err(e) = config.validate() {
        eprintln!("{} Invalid configuration: {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    let database_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.database_path.clone());
    let db_pool = match db::establish_connection(&database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    let repository = SqliteRepository::with_window_defaults(db_pool, config.window_defaults);

    let result = match cli.command {
        cli::Commands::Worker(command) => {
            commands::worker::worker_command(Arc::new(repository), command, &config).await
        }
        cli::Commands::Window(command) => {
            commands::window::window_command(&repository, command, &config).await
        }
        cli::Commands::Series(command) => {
            commands::series::series_command(&repository, command, &config).await
        }
        cli::Commands::Instances(command) => {
            commands::instances::instances_command(&repository, command, &config).await
        }
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::Validation(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidRRule(s) => {
                eprintln!(
                    "{} Invalid recurrence rule: {}",
                    "Error:".style(error_style),
                    s.yellow()
                );
            }
            CoreError::InvalidTimezone(s) => {
                eprintln!(
                    "{} Unknown timezone '{}'. Use IANA names like 'America/New_York'",
                    "Error:".style(error_style),
                    s.yellow()
                );
            }
            CoreError::Configuration(s) => {
                eprintln!("{} Invalid configuration: {}", "Error:".style(error_style), s);
            }
            CoreError::Conflict(s) | CoreError::Transient(s) => {
                eprintln!(
                    "{} {} (try again)",
                    "Error:".style(error_style),
                    s
                );
            }
            CoreError::Database(e) => {
                eprintln!("{} Database error: {}", "Error:".style(error_style), e);
            }
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {}", "Error:".style(error_style), err);
    }
}
