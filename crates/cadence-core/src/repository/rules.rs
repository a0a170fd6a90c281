use crate::error::CoreError;
use crate::models::{
    join_list, parse_list, CreatedSeries, EventTemplate, Frequency, NewRecurringEvent,
    RecurrenceRule, RuleParams,
};
use crate::recurrence::validate_rule;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use uuid::Uuid;

/// Row shape of `recurrence_rules`; list columns are stored comma separated.
#[derive(Debug, FromRow)]
pub(crate) struct RuleRow {
    id: Uuid,
    base_template_id: Uuid,
    organization_id: Uuid,
    original_series_id: Uuid,
    rrule: String,
    frequency: Frequency,
    interval: i64,
    by_day: String,
    by_month: String,
    by_month_day: String,
    timezone: String,
    start_at: DateTime<Utc>,
    until_at: Option<DateTime<Utc>>,
    count: Option<i64>,
    latest_instance_date: Option<DateTime<Utc>>,
    generated_count: i64,
    is_active: bool,
    creator_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for RecurrenceRule {
    type Error = CoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt =
            |what: &str| CoreError::InvalidRRule(format!("stored rule {id} has invalid {what}"));
        Ok(RecurrenceRule {
            id,
            base_template_id: row.base_template_id,
            organization_id: row.organization_id,
            original_series_id: row.original_series_id,
            frequency: row.frequency,
            interval: u32::try_from(row.interval).map_err(|_| corrupt("interval"))?,
            by_day: parse_list(&row.by_day).map_err(|_| corrupt("by_day"))?,
            by_month: parse_list(&row.by_month).map_err(|_| corrupt("by_month"))?,
            by_month_day: parse_list(&row.by_month_day).map_err(|_| corrupt("by_month_day"))?,
            start_at: row.start_at,
            until: row.until_at,
            count: row
                .count
                .map(u32::try_from)
                .transpose()
                .map_err(|_| corrupt("count"))?,
            latest_instance_date: row.latest_instance_date,
            generated_count: u32::try_from(row.generated_count)
                .map_err(|_| corrupt("generated_count"))?,
            is_active: row.is_active,
            creator_id: row.creator_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            rrule: row.rrule,
            timezone: row.timezone,
        })
    }
}

pub(crate) fn rules_from_rows(rows: Vec<RuleRow>) -> Result<Vec<RecurrenceRule>, CoreError> {
    rows.into_iter().map(RecurrenceRule::try_from).collect()
}

/// Builds a fresh rule for `template`. `rrule` must be the canonical string
/// returned by [`validate_rule`].
pub(crate) fn build_rule(
    template: &EventTemplate,
    params: RuleParams,
    rrule: String,
    original_series_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> RecurrenceRule {
    let id = Uuid::now_v7();
    RecurrenceRule {
        id,
        base_template_id: template.id,
        organization_id: template.organization_id,
        original_series_id: original_series_id.unwrap_or(id),
        rrule,
        frequency: params.frequency,
        interval: params.interval,
        by_day: params.by_day,
        by_month: params.by_month,
        by_month_day: params.by_month_day,
        timezone: params.timezone,
        start_at: template.start_at,
        until: params.until,
        count: params.count,
        latest_instance_date: None,
        generated_count: 0,
        is_active: true,
        creator_id: template.creator_id,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl super::RuleRepository for SqliteRepository {
    async fn create_recurring_event(
        &self,
        data: NewRecurringEvent,
        now: DateTime<Utc>,
    ) -> Result<CreatedSeries, CoreError> {
        if data.name.trim().is_empty() {
            return Err(CoreError::Validation("name must not be empty".into()));
        }
        if data.end_at <= data.start_at {
            return Err(CoreError::Validation(
                "end time must be after start time".into(),
            ));
        }
        let rrule = validate_rule(&data.recurrence, data.start_at)?;

        let template = EventTemplate {
            id: Uuid::now_v7(),
            organization_id: data.organization_id,
            name: data.name,
            description: data.description,
            location: data.location,
            all_day: data.all_day,
            is_public: data.is_public,
            is_registerable: data.is_registerable,
            is_invite_only: data.is_invite_only,
            start_at: data.start_at,
            end_at: data.end_at,
            creator_id: data.creator_id,
            updater_id: None,
            created_at: now,
            updated_at: now,
        };
        let mut rule = build_rule(&template, data.recurrence, rrule, None, now);

        let mut tx = self.begin_write().await?;
        Self::insert_template_in_transaction(&mut tx, &template).await?;
        Self::insert_rule_in_transaction(&mut tx, &rule).await?;
        let window = Self::ensure_window_in_transaction(
            &mut tx,
            template.organization_id,
            self.window_defaults(),
            now,
        )
        .await?;
        let seeded_instances = if data.seed_instances {
            Self::seed_rule_in_transaction(&mut tx, &mut rule, &template, &window, now).await?
        } else {
            Vec::new()
        };
        tx.commit().await?;

        tracing::info!(
            organization_id = %template.organization_id,
            template_id = %template.id,
            rule_id = %rule.id,
            rrule = %rule.rrule,
            seeded = seeded_instances.len(),
            "created recurring event"
        );

        Ok(CreatedSeries {
            template,
            rule,
            seeded_instances,
        })
    }

    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError> {
        let row: Option<RuleRow> = sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.map(RecurrenceRule::try_from).transpose()
    }

    async fn find_rule_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<RecurrenceRule>, CoreError> {
        let row: Option<RuleRow> =
            sqlx::query_as("SELECT * FROM recurrence_rules WHERE base_template_id = $1")
                .bind(template_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(RecurrenceRule::try_from).transpose()
    }

    async fn find_rules_for_organization(
        &self,
        organization_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<RecurrenceRule>, CoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT * FROM recurrence_rules
            WHERE organization_id = $1 AND ($2 = 0 OR is_active = 1)
            ORDER BY start_at, id"#,
        )
        .bind(organization_id)
        .bind(active_only)
        .fetch_all(self.pool())
        .await?;
        rules_from_rows(rows)
    }

    async fn set_rule_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<RecurrenceRule, CoreError> {
        let mut tx = self.begin_write().await?;
        let result =
            sqlx::query("UPDATE recurrence_rules SET is_active = $1, updated_at = $2 WHERE id = $3")
                .bind(active)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Rule with id {} not found", id)));
        }
        let rule = Self::find_rule_in_transaction(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(rule_id = %id, active, "rule activity changed");
        Ok(rule)
    }
}

impl SqliteRepository {
    pub(crate) async fn insert_rule_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule: &RecurrenceRule,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO recurrence_rules (id, base_template_id, organization_id, original_series_id,
                rrule, frequency, interval, by_day, by_month, by_month_day, timezone, start_at, until_at,
                count, latest_instance_date, generated_count, is_active, creator_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"#,
        )
        .bind(rule.id)
        .bind(rule.base_template_id)
        .bind(rule.organization_id)
        .bind(rule.original_series_id)
        .bind(&rule.rrule)
        .bind(rule.frequency)
        .bind(i64::from(rule.interval))
        .bind(join_list(&rule.by_day))
        .bind(join_list(&rule.by_month))
        .bind(join_list(&rule.by_month_day))
        .bind(&rule.timezone)
        .bind(rule.start_at)
        .bind(rule.until)
        .bind(rule.count.map(i64::from))
        .bind(rule.latest_instance_date)
        .bind(i64::from(rule.generated_count))
        .bind(rule.is_active)
        .bind(rule.creator_id)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub(crate) async fn find_rule_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<RecurrenceRule, CoreError> {
        let row: RuleRow = sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Rule with id {} not found", id)))?;
        RecurrenceRule::try_from(row)
    }

    pub(crate) async fn find_active_rules_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        organization_id: Uuid,
    ) -> Result<Vec<RecurrenceRule>, CoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT * FROM recurrence_rules
            WHERE organization_id = $1 AND is_active = 1
            ORDER BY created_at, id"#,
        )
        .bind(organization_id)
        .fetch_all(&mut **tx)
        .await?;
        rules_from_rows(rows)
    }

    pub(crate) async fn update_rule_cursor_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule: &RecurrenceRule,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE recurrence_rules
            SET latest_instance_date = $1, generated_count = $2, updated_at = $3
            WHERE id = $4"#,
        )
        .bind(rule.latest_instance_date)
        .bind(i64::from(rule.generated_count))
        .bind(now)
        .bind(rule.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Rewrites the bounds of a rule that was cut short by a series split.
    pub(crate) async fn update_rule_bounds_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        rule: &RecurrenceRule,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"UPDATE recurrence_rules
            SET rrule = $1, until_at = $2, count = $3, latest_instance_date = $4,
                generated_count = $5, is_active = $6, updated_at = $7
            WHERE id = $8"#,
        )
        .bind(&rule.rrule)
        .bind(rule.until)
        .bind(rule.count.map(i64::from))
        .bind(rule.latest_instance_date)
        .bind(i64::from(rule.generated_count))
        .bind(rule.is_active)
        .bind(now)
        .bind(rule.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
