use crate::error::CoreError;
use crate::models::{
    EventTemplate, OrganizationRun, PruneOutcome, RecurrenceRule, RecurringEventInstance,
    WindowConfig,
};
use crate::recurrence::{ExpansionBounds, Occurrence, RecurrenceExpander};
use crate::repository::windows::{months_after, months_before};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

/// Rows per multi-row insert; keeps bind parameters well under SQLite's limit.
const INSERT_CHUNK: usize = 500;

#[async_trait]
impl super::MaterializationRepository for SqliteRepository {
    async fn claim_window(
        &self,
        window: &WindowConfig,
        worker_id: &str,
        lease_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowConfig>, CoreError> {
        let claimed = sqlx::query_as(
            r#"UPDATE window_configs
            SET lease_owner = $1, lease_expires_at = $2, version = version + 1
            WHERE organization_id = $3 AND version = $4 AND is_enabled = 1
              AND (lease_expires_at IS NULL OR lease_expires_at < $5)
            RETURNING *"#,
        )
        .bind(worker_id)
        .bind(now + lease_ttl)
        .bind(window.organization_id)
        .bind(window.version)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(claimed)
    }

    async fn release_window(
        &self,
        organization_id: Uuid,
        worker_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE window_configs SET lease_owner = NULL, lease_expires_at = NULL
            WHERE organization_id = $1 AND lease_owner = $2"#,
        )
        .bind(organization_id)
        .bind(worker_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn materialize_window(
        &self,
        claimed: &WindowConfig,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrganizationRun, CoreError> {
        let organization_id = claimed.organization_id;
        let target = months_after(now, claimed.hot_window_months_ahead)?;
        let previous_end = claimed.current_window_end_date;
        let mut budget = usize::try_from(claimed.max_instances_per_run).unwrap_or(0);

        let mut tx = self.pool().begin().await?;
        // First statement is a write: it takes the write lock and checks the lease
        let held = sqlx::query(
            r#"UPDATE window_configs SET updated_at = $1
            WHERE organization_id = $2 AND lease_owner = $3 AND version = $4"#,
        )
        .bind(now)
        .bind(organization_id)
        .bind(worker_id)
        .bind(claimed.version)
        .execute(&mut *tx)
        .await?;
        if held.rows_affected() == 0 {
            return Err(CoreError::Transient(format!(
                "lease on organization {} is no longer held by {}",
                organization_id, worker_id
            )));
        }

        let rules = Self::find_active_rules_in_transaction(&mut tx, organization_id).await?;
        let rule_count = rules.len();

        let mut instances_created = 0u64;
        let mut rules_processed = 0usize;
        // Set when the cap stops expansion: the point every rule is known to be expanded to
        let mut stopped_at: Option<DateTime<Utc>> = None;

        for (index, mut rule) in rules.into_iter().enumerate() {
            if budget == 0 {
                stopped_at = Some(previous_end);
                break;
            }

            let template = Self::find_template_in_transaction(&mut tx, rule.base_template_id).await?;
            let expansion = RecurrenceExpander::new(&rule)?.expand(
                &ExpansionBounds::new(claimed.retention_start_date, target).with_limit(budget),
                template.duration(),
            );
            budget = budget.saturating_sub(expansion.occurrences.len());

            let inserted =
                Self::insert_occurrences_in_transaction(&mut tx, &rule, &expansion.occurrences, now)
                    .await?;
            instances_created += inserted.len() as u64;

            if expansion.advanced(&rule) {
                expansion.advance_cursor(&mut rule);
                Self::update_rule_cursor_in_transaction(&mut tx, &rule, now).await?;
            }
            rules_processed += 1;

            if expansion.truncated {
                let reached = expansion.latest_instance_date.unwrap_or(previous_end);
                stopped_at = Some(if index + 1 < rule_count {
                    reached.min(previous_end)
                } else {
                    reached
                });
                break;
            }
        }

        let truncated = stopped_at.is_some();
        let window_end = match stopped_at {
            Some(point) => point.min(target).max(previous_end),
            None => target.max(previous_end),
        };

        sqlx::query(
            r#"UPDATE window_configs
            SET current_window_end_date = $1, last_processed_at = $2,
                last_processed_instance_count = $3, version = version + 1,
                lease_owner = NULL, lease_expires_at = NULL, updated_at = $2
            WHERE organization_id = $4"#,
        )
        .bind(window_end)
        .bind(now)
        .bind(instances_created as i64)
        .bind(organization_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(OrganizationRun {
            organization_id,
            rules_processed,
            instances_created,
            window_end,
            truncated,
        })
    }

    async fn prune_window(
        &self,
        organization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PruneOutcome, CoreError> {
        let mut tx = self.begin_write().await?;
        let window = Self::find_window_in_transaction(&mut tx, organization_id).await?;

        let cutoff = months_before(now, window.history_retention_months)?;
        let retention_start = cutoff
            .min(window.current_window_end_date)
            .max(window.retention_start_date);

        sqlx::query(
            r#"DELETE FROM event_exceptions WHERE recurring_event_instance_id IN (
                SELECT id FROM recurring_event_instances
                WHERE organization_id = $1 AND actual_end_time < $2)"#,
        )
        .bind(organization_id)
        .bind(retention_start)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query(
            "DELETE FROM recurring_event_instances WHERE organization_id = $1 AND actual_end_time < $2",
        )
        .bind(organization_id)
        .bind(retention_start)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if retention_start != window.retention_start_date {
            sqlx::query(
                "UPDATE window_configs SET retention_start_date = $1, updated_at = $2 WHERE organization_id = $3",
            )
            .bind(retention_start)
            .bind(now)
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(PruneOutcome {
            organization_id,
            instances_deleted: deleted,
            retention_start_date: retention_start,
        })
    }

    async fn find_enabled_windows(&self) -> Result<Vec<WindowConfig>, CoreError> {
        let windows = sqlx::query_as(
            "SELECT * FROM window_configs WHERE is_enabled = 1 ORDER BY organization_id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(windows)
    }
}

impl SqliteRepository {
    /// Inserts occurrences of `rule`, skipping any `(template, sequence)` pair
    /// that already exists. Returns only the rows actually inserted.
    pub(crate) async fn insert_occurrences_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule: &RecurrenceRule,
        occurrences: &[Occurrence],
        now: DateTime<Utc>,
    ) -> Result<Vec<RecurringEventInstance>, CoreError> {
        let mut inserted = Vec::with_capacity(occurrences.len());
        for chunk in occurrences.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"INSERT INTO recurring_event_instances (id, base_template_id, recurrence_rule_id,
                    original_series_id, organization_id, original_instance_start_time,
                    actual_start_time, actual_end_time, sequence_number, total_count, is_cancelled,
                    version, generated_at) "#,
            );
            qb.push_values(chunk, |mut b, occurrence| {
                b.push_bind(Uuid::now_v7())
                    .push_bind(rule.base_template_id)
                    .push_bind(rule.id)
                    .push_bind(rule.original_series_id)
                    .push_bind(rule.organization_id)
                    .push_bind(occurrence.start)
                    .push_bind(occurrence.start)
                    .push_bind(occurrence.end)
                    .push_bind(occurrence.sequence_number)
                    .push_bind(rule.count.map(i64::from))
                    .push_bind(false)
                    .push_bind(1_i64)
                    .push_bind(now);
            });
            qb.push(" ON CONFLICT(base_template_id, sequence_number) DO NOTHING RETURNING *");

            let rows: Vec<RecurringEventInstance> =
                qb.build_query_as().fetch_all(&mut **tx).await?;
            inserted.extend(rows);
        }
        inserted.sort_by_key(|instance| instance.sequence_number);
        Ok(inserted)
    }

    /// Materializes the first window of a freshly created rule, bounded by the
    /// organization's hot window and per-run cap.
    pub(crate) async fn seed_rule_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule: &mut RecurrenceRule,
        template: &EventTemplate,
        window: &WindowConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecurringEventInstance>, CoreError> {
        let target = months_after(now, window.hot_window_months_ahead)?;
        let limit = usize::try_from(window.max_instances_per_run).unwrap_or(0);
        let expansion = RecurrenceExpander::new(rule)?.expand(
            &ExpansionBounds::new(window.retention_start_date, target).with_limit(limit),
            template.duration(),
        );

        let inserted =
            Self::insert_occurrences_in_transaction(tx, rule, &expansion.occurrences, now).await?;
        if expansion.advanced(rule) {
            expansion.advance_cursor(rule);
            Self::update_rule_cursor_in_transaction(tx, rule, now).await?;
        }

        tracing::debug!(
            rule_id = %rule.id,
            seeded = inserted.len(),
            truncated = expansion.truncated,
            "seeded first window"
        );
        Ok(inserted)
    }
}
