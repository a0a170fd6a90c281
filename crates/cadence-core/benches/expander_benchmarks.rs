use cadence_core::models::{RecurrenceRule, RuleParams};
use cadence_core::recurrence::{validate_rule, ExpansionBounds, RecurrenceExpander};
use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

fn create_test_rule(rrule: &str, timezone: &str) -> RecurrenceRule {
    let mut params: RuleParams = rrule.parse().unwrap();
    params.timezone = timezone.to_string();
    let id = Uuid::now_v7();
    RecurrenceRule {
        id,
        base_template_id: Uuid::now_v7(),
        organization_id: Uuid::now_v7(),
        original_series_id: id,
        rrule: params.to_rrule_string(),
        frequency: params.frequency,
        interval: params.interval,
        by_day: params.by_day,
        by_month: params.by_month,
        by_month_day: params.by_month_day,
        timezone: params.timezone,
        start_at: start(),
        until: params.until,
        count: params.count,
        latest_instance_date: None,
        generated_count: 0,
        is_active: true,
        creator_id: Uuid::now_v7(),
        created_at: start(),
        updated_at: start(),
    }
}

fn bench_expansion_by_horizon(c: &mut Criterion) {
    let rule = create_test_rule("FREQ=DAILY", "UTC");
    let expander = RecurrenceExpander::new(&rule).unwrap();

    let mut group = c.benchmark_group("daily_expansion");
    for months in [1, 3, 12, 60].iter() {
        let bounds = ExpansionBounds::new(start(), start() + Duration::days(30 * months));
        group.bench_with_input(BenchmarkId::new("months", months), months, |b, _| {
            b.iter(|| expander.expand(black_box(&bounds), Duration::hours(1)))
        });
    }
    group.finish();
}

fn bench_rule_shapes(c: &mut Criterion) {
    let bounds = ExpansionBounds::new(start(), start() + Duration::days(365));
    let shapes = [
        ("weekly_byday", "FREQ=WEEKLY;BYDAY=MO,WE,FR"),
        ("monthly_ordinal", "FREQ=MONTHLY;BYDAY=-1FR"),
        ("monthly_bymonthday", "FREQ=MONTHLY;BYMONTHDAY=1,15,31"),
        ("yearly_bymonth", "FREQ=YEARLY;BYMONTH=3,9;BYDAY=2TU"),
    ];

    let mut group = c.benchmark_group("rule_shapes");
    for (name, rrule) in shapes {
        let rule = create_test_rule(rrule, "America/New_York");
        let expander = RecurrenceExpander::new(&rule).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| expander.expand(black_box(&bounds), Duration::hours(1)))
        });
    }
    group.finish();
}

fn bench_capped_expansion(c: &mut Criterion) {
    let rule = create_test_rule("FREQ=DAILY", "Europe/Berlin");
    let expander = RecurrenceExpander::new(&rule).unwrap();
    let bounds = ExpansionBounds::new(start(), start() + Duration::days(3650)).with_limit(1000);

    c.bench_function("capped_expansion_1000", |b| {
        b.iter(|| expander.expand(black_box(&bounds), Duration::hours(1)))
    });
}

fn bench_rule_validation(c: &mut Criterion) {
    let params: RuleParams = "FREQ=MONTHLY;INTERVAL=2;BYDAY=1MO,-1FR;COUNT=24"
        .parse()
        .unwrap();

    c.bench_function("rule_validation", |b| {
        b.iter(|| validate_rule(black_box(&params), start()).unwrap())
    });
}

criterion_group!(
    benches,
    bench_expansion_by_horizon,
    bench_rule_shapes,
    bench_capped_expansion,
    bench_rule_validation
);
criterion_main!(benches);
