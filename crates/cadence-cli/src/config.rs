use cadence_core::models::WindowDefaults;
use cadence_core::timezone::validate_timezone;
use cadence_core::worker::WorkerConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "cadence.toml";

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// `tracing` filter directive, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Timezone for parsing and displaying times (IANA format)
    #[serde(default = "detect_system_timezone")]
    pub default_timezone: String,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub window_defaults: WindowDefaults,
}

/// `[worker]` section
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct WorkerSettings {
    pub worker_id: Option<String>,
    pub tick_interval_secs: u64,
    pub max_organizations_per_tick: usize,
    pub lease_ttl_secs: i64,
    pub prune_every_ticks: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let defaults = WorkerConfig::default();
        Self {
            worker_id: None,
            tick_interval_secs: defaults.tick_interval.as_secs(),
            max_organizations_per_tick: defaults.max_organizations_per_tick,
            lease_ttl_secs: defaults.lease_ttl.num_seconds(),
            prune_every_ticks: defaults.prune_every_ticks,
        }
    }
}

impl WorkerSettings {
    pub fn to_worker_config(&self) -> WorkerConfig {
        let mut config = WorkerConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs.max(1)),
            max_organizations_per_tick: self.max_organizations_per_tick.max(1),
            lease_ttl: chrono::Duration::seconds(self.lease_ttl_secs.max(1)),
            prune_every_ticks: self.prune_every_ticks,
            ..WorkerConfig::default()
        };
        if let Some(worker_id) = &self.worker_id {
            config.worker_id = worker_id.clone();
        }
        config
    }
}

impl Config {
    /// Loads `cadence.toml` (or the file named by `CADENCE_CONFIG`), then
    /// `CADENCE_*` environment variables. Nested keys use `__`, e.g.
    /// `CADENCE_WORKER__TICK_INTERVAL_SECS`.
    pub fn new() -> Result<Self, figment::Error> {
        let file = std::env::var("CADENCE_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
    }

    /// Checks values figment cannot: window defaults and timezone names.
    pub fn validate(&self) -> Result<(), String> {
        self.window_defaults
            .validate()
            .map_err(|e| format!("window_defaults: {e}"))?;
        validate_timezone(&self.default_timezone).map_err(|e| e.to_string())
    }
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Detects the system timezone, falling back to UTC if detection fails
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}
