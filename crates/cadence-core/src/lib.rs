//! # Cadence Core Library
//!
//! Turns recurring event definitions into concrete, queryable instances.
//!
//! A recurring event is an [`models::EventTemplate`] plus a
//! [`models::RecurrenceRule`]. Instances are materialized ahead of time inside a
//! per-organization rolling window by the [`worker::MaterializationWorker`], so
//! reads are plain indexed range queries. Per-instance edits are stored as
//! exceptions and applied when instances are read.
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Templates, rules, instances, exceptions and window configuration
//! - [`recurrence`]: Rule validation and timezone-aware expansion
//! - [`resolver`]: Applies exceptions on top of instances and templates
//! - [`repository`]: Data access layer with Repository pattern
//! - [`worker`]: Leased, capped background materialization and pruning
//! - [`query`]: Read API filters
//! - [`timezone`]: Timezone utilities and validation
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     db,
//!     models::{NewRecurringEvent, RuleParams},
//!     query::InstanceQuery,
//!     repository::{InstanceRepository, RuleRepository, SqliteRepository},
//! };
//! use chrono::{Duration, Utc};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cadence_core::error::CoreError> {
//!     let pool = db::establish_connection("cadence.db").await?;
//!     let repo = SqliteRepository::new(pool);
//!
//!     let now = Utc::now();
//!     let organization_id = Uuid::now_v7();
//!     let created = repo
//!         .create_recurring_event(
//!             NewRecurringEvent {
//!                 organization_id,
//!                 creator_id: Uuid::now_v7(),
//!                 name: "Weekly sync".to_string(),
//!                 description: None,
//!                 location: None,
//!                 all_day: false,
//!                 is_public: true,
//!                 is_registerable: false,
//!                 is_invite_only: false,
//!                 start_at: now,
//!                 end_at: now + Duration::hours(1),
//!                 recurrence: "FREQ=WEEKLY;BYDAY=MO,WE".parse::<RuleParams>()
//!                     .map_err(|e| cadence_core::error::CoreError::InvalidRRule(e.to_string()))?,
//!                 seed_instances: true,
//!             },
//!             now,
//!         )
//!         .await?;
//!     println!("Created series {}", created.rule.original_series_id);
//!
//!     let upcoming = repo
//!         .find_instances(&InstanceQuery::new(organization_id, now, now + Duration::days(30)))
//!         .await?;
//!     println!("{} instances in the next 30 days", upcoming.len());
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod recurrence;
pub mod repository;
pub mod resolver;
pub mod timezone;
pub mod worker;
