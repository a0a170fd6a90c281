use crate::error::CoreError;
use crate::models::{EventException, InstanceOverrides, RecurringEventInstance, ResolvedInstance};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::ExceptionRepository for SqliteRepository {
    async fn update_instance(
        &self,
        instance_id: Uuid,
        overrides: InstanceOverrides,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedInstance, CoreError> {
        if overrides.is_empty() {
            return Err(CoreError::Validation("no fields to update".into()));
        }

        let mut tx = self.begin_write().await?;
        let instance = Self::apply_overrides_in_transaction(
            &mut tx,
            instance_id,
            &overrides,
            actor_id,
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            %instance_id,
            %actor_id,
            cancelled = instance.is_cancelled,
            "instance exception recorded"
        );
        self.resolve_single(instance).await
    }

    async fn cancel_instance(
        &self,
        instance_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ResolvedInstance, CoreError> {
        let instance = self.find_instance_row(instance_id).await?;
        if instance.is_cancelled {
            return self.resolve_single(instance).await;
        }
        self.update_instance(instance_id, InstanceOverrides::cancel(), actor_id, now)
            .await
    }

    async fn find_exception_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Option<EventException>, CoreError> {
        let exception =
            sqlx::query_as("SELECT * FROM event_exceptions WHERE recurring_event_instance_id = $1")
                .bind(instance_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(exception)
    }
}

impl SqliteRepository {
    async fn find_instance_row(&self, instance_id: Uuid) -> Result<RecurringEventInstance, CoreError> {
        sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
            .bind(instance_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| instance_not_found(instance_id))
    }

    async fn resolve_single(
        &self,
        instance: RecurringEventInstance,
    ) -> Result<ResolvedInstance, CoreError> {
        let template_id = instance.base_template_id;
        self.resolve_instances(vec![instance])
            .await?
            .pop()
            .ok_or_else(|| CoreError::NotFound(format!("Template with id {} not found", template_id)))
    }

    /// Merges `overrides` into the instance's exception and refreshes the
    /// instance's timing, cancellation flag and version.
    ///
    /// # Behavior
    /// - A cancelled instance only accepts an edit that un-cancels it
    /// - Moving only the start keeps the instance's duration
    /// - The end must stay after the start
    pub(crate) async fn apply_overrides_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        instance_id: Uuid,
        overrides: &InstanceOverrides,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RecurringEventInstance, CoreError> {
        let mut instance: RecurringEventInstance =
            sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
                .bind(instance_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| instance_not_found(instance_id))?;

        if instance.is_cancelled && overrides.is_cancelled != Some(false) {
            return Err(CoreError::Validation(format!(
                "instance {} is cancelled and cannot be edited",
                instance_id
            )));
        }

        let existing: Option<EventException> =
            sqlx::query_as("SELECT * FROM event_exceptions WHERE recurring_event_instance_id = $1")
                .bind(instance_id)
                .fetch_optional(&mut **tx)
                .await?;
        let mut merged = match &existing {
            Some(exception) => exception.exception_data.0.merge(overrides),
            None => overrides.clone(),
        };

        let (start, end) = if overrides.changes_timing() {
            let start = overrides.start_at.unwrap_or(instance.actual_start_time);
            let end = overrides
                .end_at
                .unwrap_or_else(|| start + (instance.actual_end_time - instance.actual_start_time));
            (start, end)
        } else {
            (instance.actual_start_time, instance.actual_end_time)
        };
        if end <= start {
            return Err(CoreError::Validation(
                "end time must be after start time".into(),
            ));
        }
        if overrides.changes_timing() {
            merged.start_at = Some(start);
            merged.end_at = Some(end);
        }
        let is_cancelled = overrides.is_cancelled.unwrap_or(instance.is_cancelled);

        sqlx::query(
            r#"INSERT INTO event_exceptions (id, recurring_event_instance_id, organization_id,
                exception_data, creator_id, updater_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NULL, $6, $6)
            ON CONFLICT(recurring_event_instance_id) DO UPDATE
            SET exception_data = excluded.exception_data, updater_id = $5, updated_at = $6"#,
        )
        .bind(Uuid::now_v7())
        .bind(instance_id)
        .bind(instance.organization_id)
        .bind(Json(&merged))
        .bind(actor_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let result = sqlx::query(
            r#"UPDATE recurring_event_instances
            SET actual_start_time = $1, actual_end_time = $2, is_cancelled = $3,
                version = version + 1, last_updated_at = $4
            WHERE id = $5 AND version = $6"#,
        )
        .bind(start)
        .bind(end)
        .bind(is_cancelled)
        .bind(now)
        .bind(instance_id)
        .bind(instance.version)
        .execute(&mut **tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!(
                "instance {} was modified concurrently",
                instance_id
            )));
        }

        instance.actual_start_time = start;
        instance.actual_end_time = end;
        instance.is_cancelled = is_cancelled;
        instance.version += 1;
        instance.last_updated_at = Some(now);
        Ok(instance)
    }
}

pub(crate) fn instance_not_found(instance_id: Uuid) -> CoreError {
    CoreError::NotFound(format!("Instance with id {} not found", instance_id))
}
