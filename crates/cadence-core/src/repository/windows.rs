use crate::error::CoreError;
use crate::models::{CleanupStatus, WindowConfig, WindowConfigUpdate, WindowDefaults};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

pub(crate) fn months_before(at: DateTime<Utc>, months: i64) -> Result<DateTime<Utc>, CoreError> {
    u32::try_from(months)
        .ok()
        .and_then(|months| at.checked_sub_months(Months::new(months)))
        .ok_or_else(|| CoreError::Configuration(format!("cannot go back {months} months")))
}

pub(crate) fn months_after(at: DateTime<Utc>, months: i64) -> Result<DateTime<Utc>, CoreError> {
    u32::try_from(months)
        .ok()
        .and_then(|months| at.checked_add_months(Months::new(months)))
        .ok_or_else(|| CoreError::Configuration(format!("cannot go forward {months} months")))
}

#[async_trait]
impl super::WindowRepository for SqliteRepository {
    async fn initialize_window(
        &self,
        organization_id: Uuid,
        defaults: &WindowDefaults,
        now: DateTime<Utc>,
    ) -> Result<WindowConfig, CoreError> {
        let mut tx = self.begin_write().await?;
        let window = Self::ensure_window_in_transaction(&mut tx, organization_id, defaults, now).await?;
        tx.commit().await?;
        Ok(window)
    }

    async fn find_window_config(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<WindowConfig>, CoreError> {
        let window = sqlx::query_as("SELECT * FROM window_configs WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(window)
    }

    async fn update_window_config(
        &self,
        organization_id: Uuid,
        update: WindowConfigUpdate,
        now: DateTime<Utc>,
    ) -> Result<WindowConfig, CoreError> {
        update.validate().map_err(CoreError::Configuration)?;

        let mut tx = self.begin_write().await?;
        let mut window = Self::find_window_in_transaction(&mut tx, organization_id).await?;

        if let Some(value) = update.hot_window_months_ahead {
            window.hot_window_months_ahead = value;
        }
        if let Some(value) = update.history_retention_months {
            window.history_retention_months = value;
        }
        if let Some(value) = update.processing_priority {
            window.processing_priority = value;
        }
        if let Some(value) = update.max_instances_per_run {
            window.max_instances_per_run = value;
        }
        if let Some(value) = update.is_enabled {
            window.is_enabled = value;
        }
        window.updated_at = now;

        sqlx::query(
            r#"UPDATE window_configs
            SET hot_window_months_ahead = $1, history_retention_months = $2, processing_priority = $3,
                max_instances_per_run = $4, is_enabled = $5, updated_at = $6
            WHERE organization_id = $7"#,
        )
        .bind(window.hot_window_months_ahead)
        .bind(window.history_retention_months)
        .bind(window.processing_priority)
        .bind(window.max_instances_per_run)
        .bind(window.is_enabled)
        .bind(window.updated_at)
        .bind(organization_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(%organization_id, ?update, "window configuration updated");
        Ok(window)
    }

    async fn find_due_windows(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<WindowConfig>, CoreError> {
        let windows = sqlx::query_as(
            r#"SELECT * FROM window_configs
            WHERE is_enabled = 1 AND (lease_expires_at IS NULL OR lease_expires_at < $1)
            ORDER BY processing_priority DESC, last_processed_at ASC, organization_id
            LIMIT $2"#,
        )
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;
        Ok(windows)
    }

    async fn cleanup_status(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CleanupStatus, CoreError> {
        let window = self
            .find_window_config(organization_id)
            .await?
            .ok_or_else(|| window_not_found(organization_id))?;
        let cutoff = months_before(now, window.history_retention_months)?;

        let (total_instances, eligible_for_cleanup): (i64, i64) = sqlx::query_as(
            r#"SELECT COUNT(*), COALESCE(SUM(CASE WHEN actual_end_time < $1 THEN 1 ELSE 0 END), 0)
            FROM recurring_event_instances WHERE organization_id = $2"#,
        )
        .bind(cutoff)
        .bind(organization_id)
        .fetch_one(self.pool())
        .await?;

        Ok(CleanupStatus {
            organization_id,
            total_instances,
            eligible_for_cleanup,
            retention_cutoff: cutoff,
            retention_start_date: window.retention_start_date,
            history_retention_months: window.history_retention_months,
        })
    }
}

fn window_not_found(organization_id: Uuid) -> CoreError {
    CoreError::NotFound(format!(
        "Window configuration for organization {} not found",
        organization_id
    ))
}

impl SqliteRepository {
    /// Returns the organization's window, creating it from `defaults` when absent.
    ///
    /// A new window starts with `current_window_end_date = now` and
    /// `retention_start_date = now - history_retention_months`.
    pub(crate) async fn ensure_window_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        organization_id: Uuid,
        defaults: &WindowDefaults,
        now: DateTime<Utc>,
    ) -> Result<WindowConfig, CoreError> {
        let existing: Option<WindowConfig> =
            sqlx::query_as("SELECT * FROM window_configs WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some(window) = existing {
            return Ok(window);
        }

        defaults.validate().map_err(CoreError::Configuration)?;
        let retention_start = months_before(now, defaults.history_retention_months)?;

        sqlx::query(
            r#"INSERT INTO window_configs (id, organization_id, hot_window_months_ahead,
                history_retention_months, current_window_end_date, retention_start_date,
                last_processed_at, last_processed_instance_count, is_enabled, processing_priority,
                max_instances_per_run, version, lease_owner, lease_expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, 0, 1, $7, $8, 0, NULL, NULL, $9, $9)
            ON CONFLICT(organization_id) DO NOTHING"#,
        )
        .bind(Uuid::now_v7())
        .bind(organization_id)
        .bind(defaults.hot_window_months_ahead)
        .bind(defaults.history_retention_months)
        .bind(now)
        .bind(retention_start)
        .bind(defaults.processing_priority)
        .bind(defaults.max_instances_per_run)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        tracing::info!(%organization_id, "initialized window configuration");
        Self::find_window_in_transaction(tx, organization_id).await
    }

    pub(crate) async fn find_window_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        organization_id: Uuid,
    ) -> Result<WindowConfig, CoreError> {
        sqlx::query_as("SELECT * FROM window_configs WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| window_not_found(organization_id))
    }
}
