use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::error::CoreError;
use crate::models::{Frequency, RecurrenceRule, RuleParams};
use crate::timezone::{parse_timezone, resolve_local, validate_timezone};

/// A single raw occurrence produced by the expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub sequence_number: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Time bounds for one expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionBounds {
    /// Occurrences starting before this point consume sequence numbers but are not returned
    pub from: DateTime<Utc>,
    /// Exclusive upper bound on occurrence start
    pub to: DateTime<Utc>,
    /// Maximum number of occurrences to return
    pub limit: Option<usize>,
}

impl ExpansionBounds {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of expanding a rule, including the cursor the rule should persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub occurrences: Vec<Occurrence>,
    /// Start of the last occurrence consumed, returned or not
    pub latest_instance_date: Option<DateTime<Utc>>,
    pub generated_count: u32,
    /// The rule's `until` or `count` has been reached
    pub exhausted: bool,
    /// The limit stopped expansion before `to`
    pub truncated: bool,
}

impl Expansion {
    fn starting_at(rule: &RecurrenceRule) -> Self {
        Self {
            occurrences: Vec::new(),
            latest_instance_date: rule.latest_instance_date,
            generated_count: rule.generated_count,
            exhausted: false,
            truncated: false,
        }
    }

    /// Moves the rule's cursor past everything this expansion consumed.
    pub fn advance_cursor(&self, rule: &mut RecurrenceRule) {
        rule.latest_instance_date = self.latest_instance_date;
        rule.generated_count = self.generated_count;
    }

    /// Whether the rule's cursor moved.
    pub fn advanced(&self, rule: &RecurrenceRule) -> bool {
        self.generated_count != rule.generated_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrdinalScope {
    Month,
    Year,
}

/// Expands a recurrence rule into concrete occurrences.
///
/// Expansion runs on local wall-clock time in the rule's timezone, so a
/// 09:00 meeting stays at 09:00 across DST changes. Periods (days, weeks
/// starting Monday, months, years) are counted from the rule start and
/// stepped by the interval; `BYDAY`, `BYMONTH` and `BYMONTHDAY` expand or
/// filter the dates inside each period.
///
/// The expander resumes from the rule's cursor: occurrences at or before
/// `latest_instance_date` are never produced again, and sequence numbers
/// continue from `generated_count`.
#[derive(Debug)]
pub struct RecurrenceExpander<'a> {
    rule: &'a RecurrenceRule,
    timezone: Tz,
    anchor: NaiveDate,
    time_of_day: NaiveTime,
}

impl<'a> RecurrenceExpander<'a> {
    pub fn new(rule: &'a RecurrenceRule) -> Result<Self, CoreError> {
        let timezone = parse_timezone(&rule.timezone)?;
        let local_start = rule.start_at.with_timezone(&timezone);
        Ok(Self {
            rule,
            timezone,
            anchor: local_start.date_naive(),
            time_of_day: local_start.time(),
        })
    }

    /// Expands the rule within `bounds`.
    ///
    /// # Behavior
    /// - Inactive rules and empty bounds yield nothing and leave the cursor alone
    /// - Stops at the first of: start ≥ `to`, start > `until`, `count` reached, `limit` reached
    /// - End of each occurrence is its start plus `duration`
    pub fn expand(&self, bounds: &ExpansionBounds, duration: Duration) -> Expansion {
        let rule = self.rule;
        let mut expansion = Expansion::starting_at(rule);

        if !rule.is_active || bounds.from >= bounds.to {
            return expansion;
        }
        if rule.is_count_exhausted() {
            expansion.exhausted = true;
            return expansion;
        }

        let resume_from = match rule.latest_instance_date {
            Some(latest) if latest > rule.start_at => latest,
            _ => rule.start_at,
        };
        let resume_date = resume_from.with_timezone(&self.timezone).date_naive();
        let last_date = bounds.to.with_timezone(&self.timezone).date_naive();
        let until_date = rule
            .until
            .map(|until| until.with_timezone(&self.timezone).date_naive());

        let mut period = self.period_index(resume_date).max(0);
        loop {
            let Some(period_start) = self.period_start(period) else {
                expansion.exhausted = true;
                break;
            };
            if period_start > last_date {
                break;
            }
            if until_date.is_some_and(|until| period_start > until) {
                expansion.exhausted = true;
                break;
            }

            for date in self.candidates(period_start) {
                let start = resolve_local(&self.timezone, date.and_time(self.time_of_day));
                if start < rule.start_at {
                    continue;
                }
                if expansion
                    .latest_instance_date
                    .is_some_and(|latest| start <= latest)
                {
                    continue;
                }
                if rule.until.is_some_and(|until| start > until)
                    || rule
                        .count
                        .is_some_and(|count| expansion.generated_count >= count)
                {
                    expansion.exhausted = true;
                    return expansion;
                }
                if start >= bounds.to {
                    return expansion;
                }

                let visible = start >= bounds.from;
                if visible
                    && bounds
                        .limit
                        .is_some_and(|limit| expansion.occurrences.len() >= limit)
                {
                    expansion.truncated = true;
                    return expansion;
                }

                expansion.generated_count += 1;
                expansion.latest_instance_date = Some(start);
                if visible {
                    expansion.occurrences.push(Occurrence {
                        sequence_number: i64::from(expansion.generated_count),
                        start,
                        end: start + duration,
                    });
                }
            }

            period += 1;
        }

        if rule
            .count
            .is_some_and(|count| expansion.generated_count >= count)
        {
            expansion.exhausted = true;
        }
        expansion
    }

    fn interval(&self) -> i64 {
        i64::from(self.rule.interval.max(1))
    }

    /// Index of the interval-aligned period containing `date`.
    fn period_index(&self, date: NaiveDate) -> i64 {
        let units = match self.rule.frequency {
            Frequency::Daily => (date - self.anchor).num_days(),
            Frequency::Weekly => (week_start(date) - week_start(self.anchor)).num_days() / 7,
            Frequency::Monthly => month_number(date) - month_number(self.anchor),
            Frequency::Yearly => i64::from(date.year() - self.anchor.year()),
        };
        units.div_euclid(self.interval())
    }

    /// First date of the `index`-th period.
    fn period_start(&self, index: i64) -> Option<NaiveDate> {
        let step = index.checked_mul(self.interval())?;
        match self.rule.frequency {
            Frequency::Daily => self.anchor.checked_add_signed(Duration::try_days(step)?),
            Frequency::Weekly => {
                week_start(self.anchor).checked_add_signed(Duration::try_days(step.checked_mul(7)?)?)
            }
            Frequency::Monthly => {
                let total = month_number(self.anchor).checked_add(step)?;
                let year = i32::try_from(total.div_euclid(12)).ok()?;
                NaiveDate::from_ymd_opt(year, (total.rem_euclid(12) + 1) as u32, 1)
            }
            Frequency::Yearly => {
                let year = i64::from(self.anchor.year()).checked_add(step)?;
                NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)
            }
        }
    }

    /// Candidate dates of one period in ascending order.
    fn candidates(&self, period_start: NaiveDate) -> Vec<NaiveDate> {
        let rule = self.rule;
        match rule.frequency {
            Frequency::Daily => {
                let date = period_start;
                let keep = self.matches_month(date.month())
                    && self.matches_month_day(date)
                    && self.matches_by_day(date, OrdinalScope::Month);
                if keep {
                    vec![date]
                } else {
                    Vec::new()
                }
            }
            Frequency::Weekly => {
                let mut weekdays: Vec<Weekday> = if rule.by_day.is_empty() {
                    vec![self.anchor.weekday()]
                } else {
                    rule.by_day.iter().map(|token| token.weekday).collect()
                };
                weekdays.sort_by_key(|weekday| weekday.num_days_from_monday());
                weekdays.dedup();
                weekdays
                    .into_iter()
                    .filter_map(|weekday| {
                        period_start.checked_add_signed(Duration::days(i64::from(
                            weekday.num_days_from_monday(),
                        )))
                    })
                    .filter(|date| self.matches_month(date.month()))
                    .collect()
            }
            Frequency::Monthly => self.month_candidates(
                period_start.year(),
                period_start.month(),
                OrdinalScope::Month,
            ),
            Frequency::Yearly => {
                let year = period_start.year();
                let (months, scope) = if !rule.by_month.is_empty() {
                    let mut months = rule.by_month.clone();
                    months.sort_unstable();
                    months.dedup();
                    (months, OrdinalScope::Month)
                } else if !rule.by_day.is_empty() || !rule.by_month_day.is_empty() {
                    ((1..=12).collect(), OrdinalScope::Year)
                } else {
                    (vec![self.anchor.month()], OrdinalScope::Year)
                };
                months
                    .into_iter()
                    .flat_map(|month| self.month_candidates(year, month, scope))
                    .collect()
            }
        }
    }

    fn month_candidates(&self, year: i32, month: u32, scope: OrdinalScope) -> Vec<NaiveDate> {
        let rule = self.rule;
        if !self.matches_month(month) {
            return Vec::new();
        }
        if rule.by_day.is_empty() && rule.by_month_day.is_empty() {
            return NaiveDate::from_ymd_opt(year, month, self.anchor.day())
                .into_iter()
                .collect();
        }
        (1..=days_in_month(year, month))
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .filter(|date| self.matches_month_day(*date) && self.matches_by_day(*date, scope))
            .collect()
    }

    fn matches_month(&self, month: u32) -> bool {
        self.rule.by_month.is_empty() || self.rule.by_month.contains(&month)
    }

    fn matches_month_day(&self, date: NaiveDate) -> bool {
        if self.rule.by_month_day.is_empty() {
            return true;
        }
        let day = date.day() as i32;
        let length = days_in_month(date.year(), date.month()) as i32;
        self.rule
            .by_month_day
            .iter()
            .any(|&wanted| (wanted > 0 && wanted == day) || (wanted < 0 && length + wanted + 1 == day))
    }

    fn matches_by_day(&self, date: NaiveDate, scope: OrdinalScope) -> bool {
        if self.rule.by_day.is_empty() {
            return true;
        }
        let (index, length) = match scope {
            OrdinalScope::Month => (
                date.day0() as i32,
                days_in_month(date.year(), date.month()) as i32,
            ),
            OrdinalScope::Year => (date.ordinal0() as i32, days_in_year(date.year()) as i32),
        };
        let from_start = index / 7 + 1;
        let from_end = (length - 1 - index) / 7 + 1;

        self.rule.by_day.iter().any(|token| {
            token.weekday == date.weekday()
                && match token.ordinal {
                    None => true,
                    Some(n) if n > 0 => n == from_start,
                    Some(n) => -n == from_end,
                }
        })
    }
}

/// Expands `rule` over `[from, to)` with no limit.
pub fn expand(
    rule: &RecurrenceRule,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    duration: Duration,
) -> Result<Vec<Occurrence>, CoreError> {
    let expander = RecurrenceExpander::new(rule)?;
    Ok(expander
        .expand(&ExpansionBounds::new(from, to), duration)
        .occurrences)
}

/// Validates recurrence parameters for a rule starting at `start` and returns
/// the canonical RRULE string to store.
///
/// # Errors
/// - `Validation` for structurally degenerate rules (interval 0, day 0, both
///   `until` and `count`, ordinals on daily/weekly rules, ...)
/// - `InvalidTimezone` for unknown IANA names
/// - `InvalidRRule` if the canonical string is rejected by the RRULE parser
pub fn validate_rule(params: &RuleParams, start: DateTime<Utc>) -> Result<String, CoreError> {
    if params.interval < 1 {
        return Err(CoreError::Validation("interval must be at least 1".into()));
    }
    if params.until.is_some() && params.count.is_some() {
        return Err(CoreError::Validation(
            "until and count are mutually exclusive".into(),
        ));
    }
    if params.count == Some(0) {
        return Err(CoreError::Validation("count must be at least 1".into()));
    }
    if params.until.is_some_and(|until| until < start) {
        return Err(CoreError::Validation(
            "until is earlier than the rule start".into(),
        ));
    }
    if let Some(month) = params.by_month.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(CoreError::Validation(format!(
            "by_month value {month} is outside 1..=12"
        )));
    }
    if let Some(day) = params
        .by_month_day
        .iter()
        .find(|d| **d == 0 || d.abs() > 31)
    {
        return Err(CoreError::Validation(format!(
            "by_month_day value {day} is outside [-31, 31] or zero"
        )));
    }
    if params.frequency == Frequency::Weekly && !params.by_month_day.is_empty() {
        return Err(CoreError::Validation(
            "by_month_day cannot be combined with a weekly rule".into(),
        ));
    }
    for token in &params.by_day {
        let Some(ordinal) = token.ordinal else {
            continue;
        };
        let max = match params.frequency {
            Frequency::Daily | Frequency::Weekly => {
                return Err(CoreError::Validation(format!(
                    "ordinal weekday {token} needs a monthly or yearly rule"
                )));
            }
            Frequency::Monthly => 5,
            Frequency::Yearly if !params.by_month.is_empty() => 5,
            Frequency::Yearly => 53,
        };
        if ordinal == 0 || ordinal.abs() > max {
            return Err(CoreError::Validation(format!(
                "ordinal weekday {token} is out of range"
            )));
        }
    }
    validate_timezone(&params.timezone)?;

    let rrule = params.to_rrule_string();
    format!(
        "DTSTART:{}\nRRULE:{}",
        start.format("%Y%m%dT%H%M%SZ"),
        rrule
    )
    .parse::<RRuleSet>()
    .map_err(|e| CoreError::InvalidRRule(e.to_string()))?;

    Ok(rrule)
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_number(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeekdayToken;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn rule_from(params: RuleParams, start: DateTime<Utc>) -> RecurrenceRule {
        RecurrenceRule {
            id: Uuid::now_v7(),
            base_template_id: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            original_series_id: Uuid::now_v7(),
            rrule: params.to_rrule_string(),
            frequency: params.frequency,
            interval: params.interval,
            by_day: params.by_day,
            by_month: params.by_month,
            by_month_day: params.by_month_day,
            timezone: params.timezone,
            start_at: start,
            until: params.until,
            count: params.count,
            latest_instance_date: None,
            generated_count: 0,
            is_active: true,
            creator_id: Uuid::now_v7(),
            created_at: start,
            updated_at: start,
        }
    }

    fn parse_rule(rrule: &str, start: DateTime<Utc>) -> RecurrenceRule {
        rule_from(rrule.parse().unwrap(), start)
    }

    fn starts(occurrences: &[Occurrence]) -> Vec<DateTime<Utc>> {
        occurrences.iter().map(|o| o.start).collect()
    }

    mod expander_tests {
        use super::*;

        #[test]
        fn test_weekly_monday_wednesday() {
            let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO,WE", utc(2024, 1, 1, 10));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 1, 29, 0),
                Duration::hours(1),
            )
            .unwrap();

            assert_eq!(occurrences.len(), 8);
            for occurrence in &occurrences {
                let weekday = occurrence.start.weekday();
                assert!(weekday == Weekday::Mon || weekday == Weekday::Wed);
                assert_eq!(occurrence.end - occurrence.start, Duration::hours(1));
            }
            let sequence: Vec<i64> = occurrences.iter().map(|o| o.sequence_number).collect();
            assert_eq!(sequence, (1..=8).collect::<Vec<_>>());
        }

        #[test]
        fn test_biweekly_monday() {
            let rule = parse_rule("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO", utc(2024, 1, 1, 10));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 3, 1, 0),
                Duration::hours(1),
            )
            .unwrap();

            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 1, 1, 10),
                    utc(2024, 1, 15, 10),
                    utc(2024, 1, 29, 10),
                    utc(2024, 2, 12, 10),
                    utc(2024, 2, 26, 10),
                ]
            );
            let sequence: Vec<i64> = occurrences.iter().map(|o| o.sequence_number).collect();
            assert_eq!(sequence, vec![1, 2, 3, 4, 5]);
        }

        #[test]
        fn test_count_is_never_exceeded() {
            let rule = parse_rule("FREQ=DAILY;COUNT=5", utc(2024, 1, 1, 9));
            let expander = RecurrenceExpander::new(&rule).unwrap();
            let expansion = expander.expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2024, 6, 1, 0)),
                Duration::minutes(30),
            );

            assert_eq!(expansion.occurrences.len(), 5);
            assert!(expansion.exhausted);
            assert_eq!(expansion.generated_count, 5);

            let mut resumed = rule.clone();
            expansion.advance_cursor(&mut resumed);
            let again = RecurrenceExpander::new(&resumed).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2025, 1, 1, 0)),
                Duration::minutes(30),
            );
            assert!(again.occurrences.is_empty());
            assert!(again.exhausted);
        }

        #[test]
        fn test_until_is_inclusive() {
            let rule = parse_rule("FREQ=DAILY;UNTIL=20240105T100000Z", utc(2024, 1, 1, 10));
            let expansion = RecurrenceExpander::new(&rule).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2024, 2, 1, 0)),
                Duration::hours(1),
            );
            assert_eq!(expansion.occurrences.len(), 5);
            assert_eq!(
                expansion.occurrences.last().map(|o| o.start),
                Some(utc(2024, 1, 5, 10))
            );
            assert!(expansion.exhausted);
        }

        #[test]
        fn test_resume_continues_sequence_numbers() {
            let rule = parse_rule("FREQ=DAILY", utc(2024, 1, 1, 8));
            let first = RecurrenceExpander::new(&rule).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2024, 1, 4, 0)),
                Duration::hours(1),
            );
            assert_eq!(first.occurrences.len(), 3);

            let mut resumed = rule.clone();
            first.advance_cursor(&mut resumed);
            let second = RecurrenceExpander::new(&resumed).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2024, 1, 6, 0)),
                Duration::hours(1),
            );
            let sequence: Vec<i64> = second.occurrences.iter().map(|o| o.sequence_number).collect();
            assert_eq!(sequence, vec![4, 5]);
            assert_eq!(second.occurrences[0].start, utc(2024, 1, 4, 8));
        }

        #[test]
        fn test_occurrences_before_window_consume_sequence_numbers() {
            let rule = parse_rule("FREQ=DAILY", utc(2024, 1, 1, 8));
            let expansion = RecurrenceExpander::new(&rule).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 10, 0), utc(2024, 1, 12, 0)),
                Duration::hours(1),
            );
            let sequence: Vec<i64> = expansion
                .occurrences
                .iter()
                .map(|o| o.sequence_number)
                .collect();
            assert_eq!(sequence, vec![10, 11]);
            assert_eq!(expansion.generated_count, 11);
        }

        #[test]
        fn test_limit_truncates_and_keeps_cursor_at_last_returned() {
            let rule = parse_rule("FREQ=DAILY", utc(2024, 1, 1, 8));
            let expansion = RecurrenceExpander::new(&rule).unwrap().expand(
                &ExpansionBounds::new(utc(2024, 1, 1, 0), utc(2024, 2, 1, 0)).with_limit(5),
                Duration::hours(1),
            );
            assert_eq!(expansion.occurrences.len(), 5);
            assert!(expansion.truncated);
            assert_eq!(expansion.generated_count, 5);
            assert_eq!(expansion.latest_instance_date, Some(utc(2024, 1, 5, 8)));
        }

        #[test]
        fn test_inactive_rule_expands_to_nothing() {
            let mut rule = parse_rule("FREQ=DAILY", utc(2024, 1, 1, 8));
            rule.is_active = false;
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 2, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert!(occurrences.is_empty());
        }

        #[test]
        fn test_start_time_after_window_start_is_respected() {
            // Starts on a Wednesday; the Monday of that week is before the rule start
            let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO,WE", utc(2024, 1, 3, 10));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 1, 9, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![utc(2024, 1, 3, 10), utc(2024, 1, 8, 10)]
            );
        }

        #[test]
        fn test_monthly_ordinal_weekdays() {
            let first_friday = parse_rule("FREQ=MONTHLY;BYDAY=1FR", utc(2024, 1, 1, 9));
            let occurrences = expand(
                &first_friday,
                utc(2024, 1, 1, 0),
                utc(2024, 5, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 1, 5, 9),
                    utc(2024, 2, 2, 9),
                    utc(2024, 3, 1, 9),
                    utc(2024, 4, 5, 9),
                ]
            );

            let last_monday = parse_rule("FREQ=MONTHLY;BYDAY=-1MO", utc(2024, 1, 1, 9));
            let occurrences = expand(
                &last_monday,
                utc(2024, 1, 1, 0),
                utc(2024, 5, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 1, 29, 9),
                    utc(2024, 2, 26, 9),
                    utc(2024, 3, 25, 9),
                    utc(2024, 4, 29, 9),
                ]
            );
        }

        #[test]
        fn test_monthly_last_day_of_month() {
            let rule = parse_rule("FREQ=MONTHLY;BYMONTHDAY=-1", utc(2024, 1, 1, 18));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 5, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 1, 31, 18),
                    utc(2024, 2, 29, 18),
                    utc(2024, 3, 31, 18),
                    utc(2024, 4, 30, 18),
                ]
            );
        }

        #[test]
        fn test_monthly_on_31st_skips_short_months() {
            let rule = parse_rule("FREQ=MONTHLY", utc(2024, 1, 31, 12));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 6, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![utc(2024, 1, 31, 12), utc(2024, 3, 31, 12), utc(2024, 5, 31, 12)]
            );
        }

        #[test]
        fn test_yearly_leap_day() {
            let rule = parse_rule("FREQ=YEARLY", utc(2024, 2, 29, 12));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2033, 1, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![utc(2024, 2, 29, 12), utc(2028, 2, 29, 12), utc(2032, 2, 29, 12)]
            );
        }

        #[test]
        fn test_yearly_with_month_filter() {
            let rule = parse_rule("FREQ=YEARLY;BYMONTH=3,9;BYMONTHDAY=15", utc(2024, 1, 15, 12));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2026, 1, 1, 0),
                Duration::hours(1),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 3, 15, 12),
                    utc(2024, 9, 15, 12),
                    utc(2025, 3, 15, 12),
                    utc(2025, 9, 15, 12),
                ]
            );
        }

        #[test]
        fn test_wall_clock_preserved_across_dst() {
            let mut params: RuleParams = "FREQ=WEEKLY;BYDAY=MO".parse().unwrap();
            params.timezone = "America/New_York".into();
            // 09:00 EST
            let rule = rule_from(params, utc(2024, 3, 4, 14));
            let occurrences = expand(
                &rule,
                utc(2024, 3, 1, 0),
                utc(2024, 3, 12, 0),
                Duration::hours(1),
            )
            .unwrap();
            // 09:00 EDT the following week
            assert_eq!(
                starts(&occurrences),
                vec![utc(2024, 3, 4, 14), utc(2024, 3, 11, 13)]
            );
        }

        #[test]
        fn test_daily_with_weekday_filter() {
            let rule = parse_rule("FREQ=DAILY;BYDAY=SA,SU", utc(2024, 1, 1, 7));
            let occurrences = expand(
                &rule,
                utc(2024, 1, 1, 0),
                utc(2024, 1, 15, 0),
                Duration::hours(2),
            )
            .unwrap();
            assert_eq!(
                starts(&occurrences),
                vec![
                    utc(2024, 1, 6, 7),
                    utc(2024, 1, 7, 7),
                    utc(2024, 1, 13, 7),
                    utc(2024, 1, 14, 7),
                ]
            );
        }

        #[test]
        fn test_invalid_timezone_is_reported() {
            let mut rule = parse_rule("FREQ=DAILY", utc(2024, 1, 1, 7));
            rule.timezone = "Mars/Olympus".into();
            assert!(matches!(
                RecurrenceExpander::new(&rule),
                Err(CoreError::InvalidTimezone(_))
            ));
        }
    }

    mod validation_tests {
        use super::*;
        use rstest::rstest;

        #[rstest]
        #[case("FREQ=DAILY")]
        #[case("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE,FR")]
        #[case("FREQ=MONTHLY;BYDAY=1FR;COUNT=12")]
        #[case("FREQ=MONTHLY;BYMONTHDAY=-1")]
        #[case("FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=29")]
        #[case("FREQ=DAILY;UNTIL=20241231T000000Z")]
        fn test_valid_rules(#[case] rrule: &str) {
            let params: RuleParams = rrule.parse().unwrap();
            let canonical = validate_rule(&params, utc(2024, 1, 1, 9)).unwrap();
            assert_eq!(canonical, params.to_rrule_string());
        }

        #[rstest]
        #[case("FREQ=DAILY;INTERVAL=0")]
        #[case("FREQ=MONTHLY;BYMONTHDAY=0")]
        #[case("FREQ=MONTHLY;BYMONTHDAY=32")]
        #[case("FREQ=YEARLY;BYMONTH=13")]
        #[case("FREQ=WEEKLY;BYDAY=1MO")]
        #[case("FREQ=MONTHLY;BYDAY=6MO")]
        #[case("FREQ=WEEKLY;BYMONTHDAY=3")]
        #[case("FREQ=DAILY;COUNT=0")]
        #[case("FREQ=DAILY;UNTIL=20231231T000000Z")]
        fn test_degenerate_rules_are_rejected(#[case] rrule: &str) {
            let params: RuleParams = rrule.parse().unwrap();
            assert!(matches!(
                validate_rule(&params, utc(2024, 1, 1, 9)),
                Err(CoreError::Validation(_))
            ));
        }

        #[test]
        fn test_until_and_count_are_exclusive() {
            let mut params = RuleParams::new(Frequency::Daily);
            params.count = Some(3);
            params.until = Some(utc(2024, 2, 1, 0));
            assert!(matches!(
                validate_rule(&params, utc(2024, 1, 1, 9)),
                Err(CoreError::Validation(_))
            ));
        }

        #[test]
        fn test_unknown_timezone_is_rejected() {
            let mut params = RuleParams::new(Frequency::Weekly);
            params.by_day = vec![WeekdayToken::every(Weekday::Tue)];
            params.timezone = "Nowhere/Special".into();
            assert!(matches!(
                validate_rule(&params, utc(2024, 1, 1, 9)),
                Err(CoreError::InvalidTimezone(_))
            ));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn frequency_strategy() -> impl Strategy<Value = &'static str> {
            prop_oneof![
                Just("FREQ=DAILY"),
                Just("FREQ=DAILY;INTERVAL=3"),
                Just("FREQ=WEEKLY;BYDAY=MO,TH"),
                Just("FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,SA"),
                Just("FREQ=MONTHLY;BYDAY=2WE"),
                Just("FREQ=MONTHLY;BYMONTHDAY=1,15,-1"),
            ]
        }

        proptest! {
            #[test]
            fn chunked_expansion_matches_single_pass(
                rrule in frequency_strategy(),
                start_offset_hours in 0i64..(24 * 60),
                split_days in 1i64..300,
            ) {
                let start = utc(2024, 1, 1, 0) + Duration::hours(start_offset_hours);
                let rule = parse_rule(rrule, start);
                let end = utc(2025, 1, 1, 0);
                let split = start + Duration::days(split_days);
                let duration = Duration::minutes(45);

                let whole = RecurrenceExpander::new(&rule).unwrap()
                    .expand(&ExpansionBounds::new(start, end), duration);

                let first = RecurrenceExpander::new(&rule).unwrap()
                    .expand(&ExpansionBounds::new(start, split), duration);
                let mut resumed = rule.clone();
                first.advance_cursor(&mut resumed);
                let second = RecurrenceExpander::new(&resumed).unwrap()
                    .expand(&ExpansionBounds::new(start, end), duration);

                let mut chunked = first.occurrences.clone();
                chunked.extend(second.occurrences.iter().copied());
                prop_assert_eq!(&chunked, &whole.occurrences);
                prop_assert_eq!(second.generated_count, whole.generated_count);
            }

            #[test]
            fn sequence_numbers_are_contiguous_and_ordered(
                rrule in frequency_strategy(),
                window_days in 1i64..400,
            ) {
                let start = utc(2024, 1, 1, 9);
                let rule = parse_rule(rrule, start);
                let occurrences = expand(
                    &rule,
                    start,
                    start + Duration::days(window_days),
                    Duration::hours(1),
                ).unwrap();

                for (index, occurrence) in occurrences.iter().enumerate() {
                    prop_assert_eq!(occurrence.sequence_number, index as i64 + 1);
                    prop_assert!(occurrence.start >= start);
                }
                for pair in occurrences.windows(2) {
                    prop_assert!(pair[0].start < pair[1].start);
                }
            }
        }
    }
}
