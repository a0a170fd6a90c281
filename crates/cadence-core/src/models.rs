use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Templates
// ============================================================================

/// The event every instance of a recurring series inherits its fields from.
/// Instances never copy these fields; they are read at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventTemplate {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    /// Start of the first occurrence
    pub start_at: DateTime<Utc>,
    /// End of the first occurrence; `end_at - start_at` is the instance duration
    pub end_at: DateTime<Utc>,
    pub creator_id: Uuid,
    pub updater_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventTemplate {
    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }
}

/// Non-time template fields that an entire-series edit may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFields {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub all_day: Option<bool>,
    pub is_public: Option<bool>,
    pub is_registerable: Option<bool>,
    pub is_invite_only: Option<bool>,
}

impl TemplateFields {
    pub fn is_empty(&self) -> bool {
        *self == TemplateFields::default()
    }

    pub fn apply_to(&self, template: &mut EventTemplate) {
        if let Some(name) = &self.name {
            template.name = name.clone();
        }
        if let Some(description) = &self.description {
            template.description = description.clone();
        }
        if let Some(location) = &self.location {
            template.location = location.clone();
        }
        if let Some(all_day) = self.all_day {
            template.all_day = all_day;
        }
        if let Some(is_public) = self.is_public {
            template.is_public = is_public;
        }
        if let Some(is_registerable) = self.is_registerable {
            template.is_registerable = is_registerable;
        }
        if let Some(is_invite_only) = self.is_invite_only {
            template.is_invite_only = is_invite_only;
        }
    }
}

// ============================================================================
// Recurrence rules
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "DAILY"),
            Frequency::Weekly => write!(f, "WEEKLY"),
            Frequency::Monthly => write!(f, "MONTHLY"),
            Frequency::Yearly => write!(f, "YEARLY"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// A `BYDAY` entry such as `MO`, `1FR` or `-1SU`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct WeekdayToken {
    /// Nth occurrence of the weekday within the month (or year); negative counts from the end
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

impl WeekdayToken {
    pub fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    pub fn nth(ordinal: i32, weekday: Weekday) -> Self {
        Self {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

impl fmt::Display for WeekdayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "{}{}", ordinal, weekday_code(self.weekday)),
            None => write!(f, "{}", weekday_code(self.weekday)),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid weekday: {0}")]
pub struct ParseWeekdayError(String);

impl FromStr for WeekdayToken {
    type Err = ParseWeekdayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_uppercase();
        if token.len() < 2 || !token.is_char_boundary(token.len() - 2) {
            return Err(ParseWeekdayError(s.to_string()));
        }
        let (prefix, code) = token.split_at(token.len() - 2);
        let weekday = match code {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(ParseWeekdayError(s.to_string())),
        };
        let ordinal = if prefix.is_empty() {
            None
        } else {
            let value = prefix
                .strip_prefix('+')
                .unwrap_or(prefix)
                .parse::<i32>()
                .map_err(|_| ParseWeekdayError(s.to_string()))?;
            Some(value)
        };
        Ok(WeekdayToken { ordinal, weekday })
    }
}

/// The recurrence parameters a caller supplies when creating or forking a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleParams {
    pub frequency: Frequency,
    pub interval: u32,
    #[serde(default)]
    pub by_day: Vec<WeekdayToken>,
    #[serde(default)]
    pub by_month: Vec<u32>,
    #[serde(default)]
    pub by_month_day: Vec<i32>,
    pub until: Option<DateTime<Utc>>,
    pub count: Option<u32>,
    /// IANA timezone the rule is expanded in
    pub timezone: String,
}

impl RuleParams {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            by_day: Vec::new(),
            by_month: Vec::new(),
            by_month_day: Vec::new(),
            until: None,
            count: None,
            timezone: "UTC".to_string(),
        }
    }

    /// Canonical `RRULE` value (without the `RRULE:` prefix).
    pub fn to_rrule_string(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.frequency)];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if !self.by_day.is_empty() {
            parts.push(format!("BYDAY={}", join_list(&self.by_day)));
        }
        if !self.by_month.is_empty() {
            parts.push(format!("BYMONTH={}", join_list(&self.by_month)));
        }
        if !self.by_month_day.is_empty() {
            parts.push(format!("BYMONTHDAY={}", join_list(&self.by_month_day)));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={count}"));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
        }
        parts.join(";")
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid RRULE: {0}")]
pub struct ParseRuleError(pub String);

impl FromStr for RuleParams {
    type Err = ParseRuleError;

    /// Parses `FREQ=WEEKLY;BYDAY=MO,WE;COUNT=5`, optionally prefixed with `RRULE:`.
    /// The timezone is not part of an RRULE and defaults to UTC.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.trim();
        let body = body
            .strip_prefix("RRULE:")
            .or_else(|| body.strip_prefix("rrule:"))
            .unwrap_or(body);

        let mut frequency = None;
        let mut params = RuleParams::new(Frequency::Daily);

        for part in body.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ParseRuleError(format!("malformed part '{part}'")))?;
            let value = value.trim();
            match key.trim().to_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(
                        value
                            .parse::<Frequency>()
                            .map_err(|e| ParseRuleError(e.to_string()))?,
                    )
                }
                "INTERVAL" => {
                    params.interval = value
                        .parse()
                        .map_err(|_| ParseRuleError(format!("bad INTERVAL '{value}'")))?
                }
                "BYDAY" => {
                    params.by_day = parse_list(value)
                        .map_err(|e: ParseWeekdayError| ParseRuleError(e.to_string()))?
                }
                "BYMONTH" => {
                    params.by_month = parse_list(value)
                        .map_err(|_| ParseRuleError(format!("bad BYMONTH '{value}'")))?
                }
                "BYMONTHDAY" => {
                    params.by_month_day = parse_list(value)
                        .map_err(|_| ParseRuleError(format!("bad BYMONTHDAY '{value}'")))?
                }
                "COUNT" => {
                    params.count = Some(
                        value
                            .parse()
                            .map_err(|_| ParseRuleError(format!("bad COUNT '{value}'")))?,
                    )
                }
                "UNTIL" => params.until = Some(parse_until(value)?),
                "WKST" if value.eq_ignore_ascii_case("MO") => {}
                other => {
                    return Err(ParseRuleError(format!("unsupported rule part '{other}'")));
                }
            }
        }

        params.frequency = frequency.ok_or_else(|| ParseRuleError("missing FREQ".into()))?;
        Ok(params)
    }
}

fn parse_until(value: &str) -> Result<DateTime<Utc>, ParseRuleError> {
    let trimmed = value.trim_end_matches('Z');
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S") {
        return Ok(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ParseRuleError(format!("bad UNTIL '{value}'")))
}

pub(crate) fn join_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn parse_list<T: FromStr>(value: &str) -> Result<Vec<T>, T::Err> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

/// A persisted recurrence rule, one per recurring template.
///
/// `latest_instance_date` and `generated_count` form the expansion cursor: the
/// start of the last occurrence handed out and how many occurrences (and thus
/// sequence numbers) have been consumed so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: Uuid,
    pub base_template_id: Uuid,
    pub organization_id: Uuid,
    /// Shared by every fork of the same logical series
    pub original_series_id: Uuid,
    /// Canonical RRULE string
    pub rrule: String,
    pub frequency: Frequency,
    pub interval: u32,
    pub by_day: Vec<WeekdayToken>,
    pub by_month: Vec<u32>,
    pub by_month_day: Vec<i32>,
    pub timezone: String,
    /// Inclusive start of the rule
    pub start_at: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub count: Option<u32>,
    pub latest_instance_date: Option<DateTime<Utc>>,
    pub generated_count: u32,
    pub is_active: bool,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceRule {
    pub fn params(&self) -> RuleParams {
        RuleParams {
            frequency: self.frequency,
            interval: self.interval,
            by_day: self.by_day.clone(),
            by_month: self.by_month.clone(),
            by_month_day: self.by_month_day.clone(),
            until: self.until,
            count: self.count,
            timezone: self.timezone.clone(),
        }
    }

    /// True once the rule cannot produce further occurrences because its count is used up.
    pub fn is_count_exhausted(&self) -> bool {
        self.count.is_some_and(|count| self.generated_count >= count)
    }
}

// ============================================================================
// Instances and exceptions
// ============================================================================

/// A materialized occurrence. Holds only identity, timing and status; all
/// descriptive fields come from the template (and the exception, if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RecurringEventInstance {
    pub id: Uuid,
    pub base_template_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    /// Start computed by the expander; never changes
    pub original_instance_start_time: DateTime<Utc>,
    /// Start after exceptions are applied
    pub actual_start_time: DateTime<Utc>,
    pub actual_end_time: DateTime<Utc>,
    /// 1-based, monotonic per rule
    pub sequence_number: i64,
    pub total_count: Option<i64>,
    pub is_cancelled: bool,
    pub version: i64,
    pub generated_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// Field diff stored on an exception. Every present field fully replaces the
/// inherited value; absent fields fall through to the template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub location: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_registerable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invite_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cancelled: Option<bool>,
}

impl InstanceOverrides {
    pub fn cancel() -> Self {
        Self {
            is_cancelled: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == InstanceOverrides::default()
    }

    pub fn changes_timing(&self) -> bool {
        self.start_at.is_some() || self.end_at.is_some()
    }

    /// Layers `newer` over `self`; fields present in `newer` win.
    pub fn merge(&self, newer: &InstanceOverrides) -> InstanceOverrides {
        InstanceOverrides {
            name: newer.name.clone().or_else(|| self.name.clone()),
            description: newer
                .description
                .clone()
                .or_else(|| self.description.clone()),
            location: newer.location.clone().or_else(|| self.location.clone()),
            all_day: newer.all_day.or(self.all_day),
            is_public: newer.is_public.or(self.is_public),
            is_registerable: newer.is_registerable.or(self.is_registerable),
            is_invite_only: newer.is_invite_only.or(self.is_invite_only),
            start_at: newer.start_at.or(self.start_at),
            end_at: newer.end_at.or(self.end_at),
            is_cancelled: newer.is_cancelled.or(self.is_cancelled),
        }
    }

    /// The descriptive part of the diff, as applied to a template.
    pub fn template_fields(&self) -> TemplateFields {
        TemplateFields {
            name: self.name.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            all_day: self.all_day,
            is_public: self.is_public,
            is_registerable: self.is_registerable,
            is_invite_only: self.is_invite_only,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EventException {
    pub id: Uuid,
    /// Unique: at most one exception per instance
    pub recurring_event_instance_id: Uuid,
    pub organization_id: Uuid,
    pub exception_data: Json<InstanceOverrides>,
    pub creator_id: Uuid,
    pub updater_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What readers see: instance timing and status merged with template fields
/// and the exception diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInstance {
    pub id: Uuid,
    pub base_template_id: Uuid,
    pub recurrence_rule_id: Uuid,
    pub original_series_id: Uuid,
    pub organization_id: Uuid,
    pub original_instance_start_time: DateTime<Utc>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub sequence_number: i64,
    pub total_count: Option<i64>,
    pub is_cancelled: bool,
    pub version: i64,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub has_exception: bool,
    pub applied_exception: Option<InstanceOverrides>,
    pub exception_updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Window configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WindowConfig {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub hot_window_months_ahead: i64,
    pub history_retention_months: i64,
    /// Instances exist for every active rule up to (excluding) this point
    pub current_window_end_date: DateTime<Utc>,
    /// Instances ending before this point have been pruned
    pub retention_start_date: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_processed_instance_count: i64,
    pub is_enabled: bool,
    pub processing_priority: i64,
    pub max_instances_per_run: i64,
    /// Bumped by every claim and commit; claims compare against it
    pub version: i64,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const HOT_WINDOW_MONTHS_RANGE: (i64, i64) = (1, 60);
pub const HISTORY_RETENTION_MONTHS_RANGE: (i64, i64) = (0, 60);
pub const PROCESSING_PRIORITY_RANGE: (i64, i64) = (1, 10);
pub const MAX_INSTANCES_PER_RUN_RANGE: (i64, i64) = (10, 10_000);

fn check_range(field: &str, value: i64, (min, max): (i64, i64)) -> Result<(), String> {
    if value < min || value > max {
        Err(format!("{field} must be between {min} and {max}, got {value}"))
    } else {
        Ok(())
    }
}

/// Defaults applied when an organization's window is first initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowDefaults {
    pub hot_window_months_ahead: i64,
    pub history_retention_months: i64,
    pub processing_priority: i64,
    pub max_instances_per_run: i64,
}

impl Default for WindowDefaults {
    fn default() -> Self {
        Self {
            hot_window_months_ahead: 12,
            history_retention_months: 3,
            processing_priority: 5,
            max_instances_per_run: 1000,
        }
    }
}

impl WindowDefaults {
    pub fn validate(&self) -> Result<(), String> {
        check_range(
            "hot_window_months_ahead",
            self.hot_window_months_ahead,
            HOT_WINDOW_MONTHS_RANGE,
        )?;
        check_range(
            "history_retention_months",
            self.history_retention_months,
            HISTORY_RETENTION_MONTHS_RANGE,
        )?;
        check_range(
            "processing_priority",
            self.processing_priority,
            PROCESSING_PRIORITY_RANGE,
        )?;
        check_range(
            "max_instances_per_run",
            self.max_instances_per_run,
            MAX_INSTANCES_PER_RUN_RANGE,
        )
    }
}

/// Admin update of a window configuration. Out-of-range values are rejected,
/// never clamped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfigUpdate {
    pub hot_window_months_ahead: Option<i64>,
    pub history_retention_months: Option<i64>,
    pub processing_priority: Option<i64>,
    pub max_instances_per_run: Option<i64>,
    pub is_enabled: Option<bool>,
}

impl WindowConfigUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(value) = self.hot_window_months_ahead {
            check_range("hot_window_months_ahead", value, HOT_WINDOW_MONTHS_RANGE)?;
        }
        if let Some(value) = self.history_retention_months {
            check_range(
                "history_retention_months",
                value,
                HISTORY_RETENTION_MONTHS_RANGE,
            )?;
        }
        if let Some(value) = self.processing_priority {
            check_range("processing_priority", value, PROCESSING_PRIORITY_RANGE)?;
        }
        if let Some(value) = self.max_instances_per_run {
            check_range("max_instances_per_run", value, MAX_INSTANCES_PER_RUN_RANGE)?;
        }
        Ok(())
    }
}

/// Snapshot of what the next prune of an organization would remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStatus {
    pub organization_id: Uuid,
    pub total_instances: i64,
    pub eligible_for_cleanup: i64,
    pub retention_cutoff: DateTime<Utc>,
    pub retention_start_date: DateTime<Utc>,
    pub history_retention_months: i64,
}

/// Outcome of one committed materialization pass over an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRun {
    pub organization_id: Uuid,
    pub rules_processed: usize,
    pub instances_created: u64,
    pub window_end: DateTime<Utc>,
    /// The per-run instance cap stopped expansion early
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    pub organization_id: Uuid,
    pub instances_deleted: u64,
    pub retention_start_date: DateTime<Utc>,
}

// ============================================================================
// Series operations
// ============================================================================

/// Scope of an edit made through one instance of a recurring series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditScope {
    /// Only the selected instance, recorded as an exception
    ThisInstance,
    /// The selected instance and every later one, by forking the series
    ThisAndFollowing,
    /// Every template of the series; instance timing untouched
    EntireSeries,
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditScope::ThisInstance => write!(f, "instance"),
            EditScope::ThisAndFollowing => write!(f, "following"),
            EditScope::EntireSeries => write!(f, "series"),
        }
    }
}

impl FromStr for EditScope {
    type Err = ParseEditScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instance" | "this" => Ok(EditScope::ThisInstance),
            "following" | "this_and_following" | "future" => Ok(EditScope::ThisAndFollowing),
            "series" | "entire" | "all" => Ok(EditScope::EntireSeries),
            _ => Err(ParseEditScopeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid edit scope: {0}")]
pub struct ParseEditScopeError(String);

/// Data required to create a recurring event: template fields plus its rule.
#[derive(Debug, Clone)]
pub struct NewRecurringEvent {
    pub organization_id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub is_public: bool,
    pub is_registerable: bool,
    pub is_invite_only: bool,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub recurrence: RuleParams,
    /// Materialize the first window synchronously instead of waiting for the worker
    pub seed_instances: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedSeries {
    pub template: EventTemplate,
    pub rule: RecurrenceRule,
    pub seeded_instances: Vec<RecurringEventInstance>,
}

/// An edit requested through one instance.
#[derive(Debug, Clone, Default)]
pub struct InstanceEdit {
    pub overrides: InstanceOverrides,
    /// New recurrence for the following instances; only valid with `ThisAndFollowing`
    pub recurrence: Option<RuleParams>,
}

#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub truncated_rule: RecurrenceRule,
    pub template: EventTemplate,
    pub rule: RecurrenceRule,
    pub instances_removed: u64,
    pub seeded_instances: Vec<RecurringEventInstance>,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    Instance(ResolvedInstance),
    Split(SplitOutcome),
    Series(Vec<EventTemplate>),
}

/// Display position of an instance across every fork of its series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPosition {
    pub position: i64,
    /// Known only when the last fork of the series is count-bounded
    pub total: Option<i64>,
}
