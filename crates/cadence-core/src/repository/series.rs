use crate::error::CoreError;
use crate::models::{
    EditOutcome, EditScope, EventTemplate, Frequency, InstanceEdit, RecurrenceRule,
    RecurringEventInstance, RuleParams, SeriesPosition, SplitOutcome, TemplateFields,
};
use crate::recurrence::validate_rule;
use crate::repository::exceptions::instance_not_found;
use crate::repository::rules::{build_rule, rules_from_rows, RuleRow};
use crate::repository::{ExceptionRepository, SqliteRepository};
use crate::timezone::parse_timezone;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::SeriesRepository for SqliteRepository {
    async fn edit_instance(
        &self,
        instance_id: Uuid,
        edit: InstanceEdit,
        scope: EditScope,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<EditOutcome, CoreError> {
        match scope {
            EditScope::ThisInstance => {
                if edit.recurrence.is_some() {
                    return Err(CoreError::Validation(
                        "recurrence changes apply to this and following instances".into(),
                    ));
                }
                let resolved = self
                    .update_instance(instance_id, edit.overrides, actor_id, now)
                    .await?;
                Ok(EditOutcome::Instance(resolved))
            }
            EditScope::ThisAndFollowing => {
                let outcome = self.split_series(instance_id, edit, actor_id, now).await?;
                Ok(EditOutcome::Split(outcome))
            }
            EditScope::EntireSeries => {
                let overrides = &edit.overrides;
                if edit.recurrence.is_some()
                    || overrides.changes_timing()
                    || overrides.is_cancelled.is_some()
                {
                    return Err(CoreError::Validation(
                        "entire-series edits may only change descriptive fields".into(),
                    ));
                }
                let instance: RecurringEventInstance =
                    sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
                        .bind(instance_id)
                        .fetch_optional(self.pool())
                        .await?
                        .ok_or_else(|| instance_not_found(instance_id))?;
                let templates = self
                    .update_series_templates(
                        instance.original_series_id,
                        overrides.template_fields(),
                        actor_id,
                        now,
                    )
                    .await?;
                Ok(EditOutcome::Series(templates))
            }
        }
    }

    async fn split_series(
        &self,
        instance_id: Uuid,
        edit: InstanceEdit,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SplitOutcome, CoreError> {
        let overrides = &edit.overrides;
        if overrides.is_cancelled.is_some() {
            return Err(CoreError::Validation(
                "cancelling following instances is done by deleting the series".into(),
            ));
        }

        let mut tx = self.begin_write().await?;
        let instance: RecurringEventInstance =
            sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
                .bind(instance_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| instance_not_found(instance_id))?;
        if instance.is_cancelled {
            return Err(CoreError::Validation(format!(
                "instance {} is cancelled and cannot be edited",
                instance_id
            )));
        }

        let mut old_rule = Self::find_rule_in_transaction(&mut tx, instance.recurrence_rule_id).await?;
        let old_template =
            Self::find_template_in_transaction(&mut tx, instance.base_template_id).await?;

        let fork_at = instance.original_instance_start_time;
        let new_start = overrides.start_at.unwrap_or(fork_at);
        let new_end = overrides
            .end_at
            .unwrap_or_else(|| new_start + old_template.duration());
        if new_end <= new_start {
            return Err(CoreError::Validation(
                "end time must be after start time".into(),
            ));
        }

        let kept = instance.sequence_number - 1;
        let params = match &edit.recurrence {
            Some(params) => params.clone(),
            None => inherited_params(&old_rule, kept, fork_at, new_start)?,
        };
        let rrule = validate_rule(&params, new_start)?;

        // Cut the current fork short just before the edited instance
        let instances_removed =
            Self::delete_from_sequence_in_transaction(&mut tx, old_template.id, instance.sequence_number)
                .await?;
        let previous_start: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"SELECT MAX(original_instance_start_time) FROM recurring_event_instances
            WHERE base_template_id = $1 AND sequence_number < $2"#,
        )
        .bind(old_template.id)
        .bind(instance.sequence_number)
        .fetch_one(&mut *tx)
        .await?;

        if kept == 0 {
            old_rule.is_active = false;
            old_rule.generated_count = 0;
            old_rule.latest_instance_date = None;
        } else {
            if old_rule.count.is_some() {
                old_rule.count = Some(u32::try_from(kept).unwrap_or(u32::MAX));
            } else {
                old_rule.until = Some(fork_at - Duration::seconds(1));
            }
            old_rule.generated_count = u32::try_from(kept).unwrap_or(u32::MAX);
            old_rule.latest_instance_date =
                Some(previous_start.unwrap_or(fork_at - Duration::seconds(1)));
        }
        old_rule.rrule = old_rule.params().to_rrule_string();
        old_rule.updated_at = now;
        Self::update_rule_bounds_in_transaction(&mut tx, &old_rule, now).await?;

        // Fork a new template and rule carrying the edit
        let mut template = EventTemplate {
            id: Uuid::now_v7(),
            start_at: new_start,
            end_at: new_end,
            creator_id: actor_id,
            updater_id: None,
            created_at: now,
            updated_at: now,
            ..old_template.clone()
        };
        overrides.template_fields().apply_to(&mut template);
        Self::insert_template_in_transaction(&mut tx, &template).await?;

        let mut rule = build_rule(
            &template,
            params,
            rrule,
            Some(old_rule.original_series_id),
            now,
        );
        Self::insert_rule_in_transaction(&mut tx, &rule).await?;

        let window = Self::ensure_window_in_transaction(
            &mut tx,
            template.organization_id,
            self.window_defaults(),
            now,
        )
        .await?;
        let seeded_instances =
            Self::seed_rule_in_transaction(&mut tx, &mut rule, &template, &window, now).await?;
        tx.commit().await?;

        tracing::info!(
            original_series_id = %rule.original_series_id,
            truncated_rule_id = %old_rule.id,
            new_rule_id = %rule.id,
            %fork_at,
            instances_removed,
            seeded = seeded_instances.len(),
            "split series"
        );

        Ok(SplitOutcome {
            truncated_rule: old_rule,
            template,
            rule,
            instances_removed,
            seeded_instances,
        })
    }

    async fn update_series_templates(
        &self,
        original_series_id: Uuid,
        fields: TemplateFields,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventTemplate>, CoreError> {
        if fields.is_empty() {
            return Err(CoreError::Validation("no fields to update".into()));
        }

        let mut tx = self.begin_write().await?;
        let template_ids = Self::series_template_ids_in_transaction(&mut tx, original_series_id).await?;

        let mut templates = Vec::with_capacity(template_ids.len());
        for template_id in template_ids {
            let mut template = Self::find_template_in_transaction(&mut tx, template_id).await?;
            fields.apply_to(&mut template);
            template.updater_id = Some(actor_id);
            template.updated_at = now;
            Self::update_template_fields_in_transaction(&mut tx, &template).await?;
            templates.push(template);
        }
        tx.commit().await?;

        tracing::info!(%original_series_id, templates = templates.len(), "updated series templates");
        Ok(templates)
    }

    async fn delete_series(&self, original_series_id: Uuid) -> Result<u64, CoreError> {
        let mut tx = self.begin_write().await?;
        let template_ids = Self::series_template_ids_in_transaction(&mut tx, original_series_id).await?;

        sqlx::query(
            r#"DELETE FROM event_exceptions WHERE recurring_event_instance_id IN (
                SELECT id FROM recurring_event_instances WHERE original_series_id = $1)"#,
        )
        .bind(original_series_id)
        .execute(&mut *tx)
        .await?;
        let deleted = sqlx::query("DELETE FROM recurring_event_instances WHERE original_series_id = $1")
            .bind(original_series_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM recurrence_rules WHERE original_series_id = $1")
            .bind(original_series_id)
            .execute(&mut *tx)
            .await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM event_templates WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in &template_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        qb.build().execute(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!(
            %original_series_id,
            templates = template_ids.len(),
            instances = deleted,
            "deleted series"
        );
        Ok(deleted)
    }

    async fn find_series_rules(
        &self,
        original_series_id: Uuid,
    ) -> Result<Vec<RecurrenceRule>, CoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT * FROM recurrence_rules WHERE original_series_id = $1 ORDER BY start_at, created_at",
        )
        .bind(original_series_id)
        .fetch_all(self.pool())
        .await?;
        rules_from_rows(rows)
    }

    async fn series_position(&self, instance_id: Uuid) -> Result<SeriesPosition, CoreError> {
        let instance: RecurringEventInstance =
            sqlx::query_as("SELECT * FROM recurring_event_instances WHERE id = $1")
                .bind(instance_id)
                .fetch_optional(self.pool())
                .await?
                .ok_or_else(|| instance_not_found(instance_id))?;
        let rules = self.find_series_rules(instance.original_series_id).await?;

        let earlier: i64 = rules
            .iter()
            .take_while(|rule| rule.id != instance.recurrence_rule_id)
            .map(|rule| i64::from(rule.generated_count))
            .sum();

        let total = rules.split_last().and_then(|(last, before)| {
            last.count.map(|count| {
                before
                    .iter()
                    .map(|rule| i64::from(rule.generated_count))
                    .sum::<i64>()
                    + i64::from(count)
            })
        });

        Ok(SeriesPosition {
            position: earlier + instance.sequence_number,
            total,
        })
    }
}

/// Rule parameters a fork inherits when the edit does not supply new ones.
///
/// A count-bounded rule hands its remaining count to the fork. When a weekly
/// fork moves to another weekday, the weekday it was taken from is replaced.
fn inherited_params(
    rule: &RecurrenceRule,
    kept: i64,
    fork_at: DateTime<Utc>,
    new_start: DateTime<Utc>,
) -> Result<RuleParams, CoreError> {
    let mut params = rule.params();
    if let Some(count) = params.count {
        let kept = u32::try_from(kept).unwrap_or(u32::MAX);
        params.count = Some(count.saturating_sub(kept).max(1));
    }

    if params.frequency == Frequency::Weekly && !params.by_day.is_empty() {
        let tz = parse_timezone(&params.timezone)?;
        let from = fork_at.with_timezone(&tz).weekday();
        let to = new_start.with_timezone(&tz).weekday();
        if from != to {
            for token in params.by_day.iter_mut().filter(|t| t.weekday == from) {
                token.weekday = to;
            }
            let mut seen = Vec::with_capacity(params.by_day.len());
            params.by_day.retain(|token| {
                let fresh = !seen.contains(token);
                seen.push(*token);
                fresh
            });
        }
    }
    Ok(params)
}

impl SqliteRepository {
    async fn series_template_ids_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        original_series_id: Uuid,
    ) -> Result<Vec<Uuid>, CoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT base_template_id FROM recurrence_rules WHERE original_series_id = $1 ORDER BY start_at, created_at",
        )
        .bind(original_series_id)
        .fetch_all(&mut **tx)
        .await?;
        if ids.is_empty() {
            return Err(CoreError::NotFound(format!(
                "Series with id {} not found",
                original_series_id
            )));
        }
        Ok(ids)
    }

    /// Deletes a template's instances (and their exceptions) from `sequence_number` on.
    async fn delete_from_sequence_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        template_id: Uuid,
        sequence_number: i64,
    ) -> Result<u64, CoreError> {
        sqlx::query(
            r#"DELETE FROM event_exceptions WHERE recurring_event_instance_id IN (
                SELECT id FROM recurring_event_instances
                WHERE base_template_id = $1 AND sequence_number >= $2)"#,
        )
        .bind(template_id)
        .bind(sequence_number)
        .execute(&mut **tx)
        .await?;
        let removed = sqlx::query(
            "DELETE FROM recurring_event_instances WHERE base_template_id = $1 AND sequence_number >= $2",
        )
        .bind(template_id)
        .bind(sequence_number)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        Ok(removed)
    }
}
