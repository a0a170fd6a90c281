use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    CleanupStatus, CreatedSeries, EditOutcome, EditScope, EventException, EventTemplate,
    InstanceEdit, InstanceOverrides, NewRecurringEvent, OrganizationRun, PruneOutcome,
    RecurrenceRule, RecurringEventInstance, ResolvedInstance, SeriesPosition, SplitOutcome,
    TemplateFields, WindowConfig, WindowConfigUpdate, WindowDefaults,
};
use crate::query::InstanceQuery;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

pub mod exceptions;
pub mod instances;
pub mod materialization;
pub mod rules;
pub mod series;
pub mod templates;
pub mod windows;

/// Template lookups
#[async_trait]
pub trait TemplateRepository {
    async fn find_template_by_id(&self, id: Uuid) -> Result<Option<EventTemplate>, CoreError>;
    async fn find_templates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<EventTemplate>, CoreError>;
}

/// Creation of recurring events and access to their rules
#[async_trait]
pub trait RuleRepository {
    /// Creates the template and its rule, initializes the organization's
    /// window if needed and optionally seeds the first window of instances.
    async fn create_recurring_event(
        &self,
        data: NewRecurringEvent,
        now: DateTime<Utc>,
    ) -> Result<CreatedSeries, CoreError>;
    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError>;
    async fn find_rule_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<RecurrenceRule>, CoreError>;
    async fn find_rules_for_organization(
        &self,
        organization_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<RecurrenceRule>, CoreError>;
    /// Pauses or resumes expansion of a rule; existing instances stay.
    async fn set_rule_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<RecurrenceRule, CoreError>;
}

/// Read API: resolved instances, never writes
#[async_trait]
pub trait InstanceRepository {
    async fn find_instances(&self, query: &InstanceQuery)
        -> Result<Vec<ResolvedInstance>, CoreError>;
    async fn find_instance(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ResolvedInstance>, CoreError>;
    async fn find_instances_by_ids(
        &self,
        organization_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ResolvedInstance>, CoreError>;
    async fn find_raw_instances_for_template(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<RecurringEventInstance>, CoreError>;
}

/// Single-instance edits stored as exceptions
#[async_trait]
pub trait ExceptionRepository {
    /// Records `overrides` for one instance, merging with any stored diff.
    async fn update_instance(
        &self,
        instance_id: Uuid,
        overrides: InstanceOverrides,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedInstance, CoreError>;
    async fn cancel_instance(
        &self,
        instance_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedInstance, CoreError>;
    async fn find_exception_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Option<EventException>, CoreError>;
}

/// Per-organization window configuration (admin API)
#[async_trait]
pub trait WindowRepository {
    /// Returns the existing config or creates one from `defaults`.
    async fn initialize_window(
        &self,
        organization_id: Uuid,
        defaults: &WindowDefaults,
        now: DateTime<Utc>,
    ) -> Result<WindowConfig, CoreError>;
    async fn find_window_config(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<WindowConfig>, CoreError>;
    async fn update_window_config(
        &self,
        organization_id: Uuid,
        update: WindowConfigUpdate,
        now: DateTime<Utc>,
    ) -> Result<WindowConfig, CoreError>;
    /// Enabled, unleased configs by priority (desc) then last processing (oldest first).
    async fn find_due_windows(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<WindowConfig>, CoreError>;
    async fn cleanup_status(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CleanupStatus, CoreError>;
}

/// Series-level edits across forks
#[async_trait]
pub trait SeriesRepository {
    async fn edit_instance(
        &self,
        instance_id: Uuid,
        edit: InstanceEdit,
        scope: EditScope,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EditOutcome, CoreError>;
    /// "This and following": truncates the current rule before the instance
    /// and forks a new template and rule from it.
    async fn split_series(
        &self,
        instance_id: Uuid,
        edit: InstanceEdit,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SplitOutcome, CoreError>;
    async fn update_series_templates(
        &self,
        original_series_id: Uuid,
        fields: TemplateFields,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventTemplate>, CoreError>;
    /// Deletes every template, rule, instance and exception of a series.
    async fn delete_series(&self, original_series_id: Uuid) -> Result<u64, CoreError>;
    async fn find_series_rules(
        &self,
        original_series_id: Uuid,
    ) -> Result<Vec<RecurrenceRule>, CoreError>;
    async fn series_position(&self, instance_id: Uuid) -> Result<SeriesPosition, CoreError>;
}

/// Persistence used by the materialization worker
#[async_trait]
pub trait MaterializationRepository {
    /// Takes the lease on a window if its version is unchanged and no live
    /// lease exists. `None` means another worker got there first.
    async fn claim_window(
        &self,
        window: &WindowConfig,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowConfig>, CoreError>;
    async fn release_window(&self, organization_id: Uuid, worker_id: &str)
        -> Result<(), CoreError>;
    /// Expands every active rule of a claimed window and advances its cursors,
    /// all in one transaction that also releases the lease.
    async fn materialize_window(
        &self,
        claimed: &WindowConfig,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrganizationRun, CoreError>;
    async fn prune_window(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PruneOutcome, CoreError>;
    async fn find_enabled_windows(&self) -> Result<Vec<WindowConfig>, CoreError>;
}

/// Main repository trait that composes all domain traits
pub trait Repository:
    TemplateRepository
    + RuleRepository
    + InstanceRepository
    + ExceptionRepository
    + WindowRepository
    + SeriesRepository
    + MaterializationRepository
    + Send
    + Sync
{
}

/// SQLite implementation of the repository pattern
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
    window_defaults: WindowDefaults,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            window_defaults: WindowDefaults::default(),
        }
    }

    /// Uses `defaults` when the creation or split paths initialize a window.
    pub fn with_window_defaults(pool: DbPool, defaults: WindowDefaults) -> Self {
        Self {
            pool,
            window_defaults: defaults,
        }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn window_defaults(&self) -> &WindowDefaults {
        &self.window_defaults
    }

    /// Opens a transaction that holds the SQLite write lock from its first
    /// statement, so it waits on `busy_timeout` instead of failing with
    /// SQLITE_BUSY_SNAPSHOT when it writes after reading.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, CoreError> {
        let mut tx = self.pool.begin().await?;
        // Matches no rows; only takes the write lock
        sqlx::query("UPDATE window_configs SET version = version WHERE 0")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

impl Repository for SqliteRepository {}
