use cadence_core::models::{RecurrenceRule, ResolvedInstance, WindowConfig};
use cadence_core::timezone::format_with_timezone;
use chrono::{DateTime, Utc};
use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};

const TIME_FORMAT: &str = "%a %Y-%m-%d %H:%M";

fn local_time(at: DateTime<Utc>, timezone: &str) -> String {
    format_with_timezone(at, timezone, TIME_FORMAT)
        .unwrap_or_else(|_| at.format("%a %Y-%m-%d %H:%M UTC").to_string())
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

pub fn display_instances(instances: &[ResolvedInstance], timezone: &str) {
    if instances.is_empty() {
        println!("No instances found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "#", "Name", "Start", "End", "Location"]);

    for instance in instances {
        let mut row = Row::new();
        row.add_cell(Cell::new(instance.id.to_string()));
        row.add_cell(Cell::new(instance.sequence_number));

        let mut display_name = instance.name.clone();
        if instance.has_exception && !instance.is_cancelled {
            display_name.push_str(" ✎");
        }
        let mut name_cell = Cell::new(display_name);
        if instance.is_cancelled {
            name_cell = name_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey);
        } else if instance.start_at != instance.original_instance_start_time {
            name_cell = name_cell.fg(Color::Yellow);
        }
        row.add_cell(name_cell);

        let start_cell = Cell::new(local_time(instance.start_at, timezone));
        row.add_cell(if instance.start_at < Utc::now() {
            start_cell.fg(Color::DarkGrey)
        } else {
            start_cell
        });
        row.add_cell(Cell::new(local_time(instance.end_at, timezone)));
        row.add_cell(Cell::new(instance.location.as_deref().unwrap_or("")));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_instance(instance: &ResolvedInstance, timezone: &str) {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    let mut add = |field: &str, value: String| {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    };

    add("ID", instance.id.to_string());
    add("Name", instance.name.clone());
    add("Series", instance.original_series_id.to_string());
    add("Template", instance.base_template_id.to_string());
    add("Sequence", instance.sequence_number.to_string());
    add("Start", local_time(instance.start_at, timezone));
    add("End", local_time(instance.end_at, timezone));
    if instance.start_at != instance.original_instance_start_time {
        add(
            "Originally",
            local_time(instance.original_instance_start_time, timezone),
        );
    }
    add(
        "Description",
        instance.description.clone().unwrap_or_default(),
    );
    add("Location", instance.location.clone().unwrap_or_default());
    add(
        "Status",
        if instance.is_cancelled {
            "Cancelled".to_string()
        } else {
            "Scheduled".to_string()
        },
    );
    if let Some(updated) = instance.exception_updated_at {
        add("Edited", updated.humanize());
    }

    println!("{table}");
}

pub fn display_window(window: &WindowConfig) {
    let mut table = Table::new();
    table.set_header(vec!["Setting", "Value"]);
    let status = if window.is_enabled {
        Cell::new("Enabled").fg(Color::Green)
    } else {
        Cell::new("Disabled").fg(Color::DarkGrey)
    };

    table.add_row(vec![Cell::new("Organization"), Cell::new(window.organization_id)]);
    table.add_row(vec![Cell::new("Status"), status]);
    table.add_row(vec![
        Cell::new("Hot window"),
        Cell::new(format!("{} months ahead", window.hot_window_months_ahead)),
    ]);
    table.add_row(vec![
        Cell::new("Retention"),
        Cell::new(format!("{} months", window.history_retention_months)),
    ]);
    table.add_row(vec![
        Cell::new("Priority"),
        Cell::new(window.processing_priority),
    ]);
    table.add_row(vec![
        Cell::new("Max instances per run"),
        Cell::new(window.max_instances_per_run),
    ]);
    table.add_row(vec![
        Cell::new("Materialized until"),
        Cell::new(window.current_window_end_date.format("%Y-%m-%d %H:%M UTC")),
    ]);
    table.add_row(vec![
        Cell::new("Retained since"),
        Cell::new(window.retention_start_date.format("%Y-%m-%d %H:%M UTC")),
    ]);
    table.add_row(vec![
        Cell::new("Last processed"),
        Cell::new(match window.last_processed_at {
            Some(at) => format!(
                "{} ({} instances)",
                at.humanize(),
                window.last_processed_instance_count
            ),
            None => "Never".to_string(),
        }),
    ]);
    if let Some(owner) = &window.lease_owner {
        table.add_row(vec![
            Cell::new("Leased by"),
            Cell::new(owner).fg(Color::Yellow),
        ]);
    }

    println!("{table}");
}

pub fn display_due_windows(windows: &[WindowConfig]) {
    if windows.is_empty() {
        println!("No organizations are due.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Organization", "Priority", "Materialized until", "Last processed"]);
    for window in windows {
        table.add_row(vec![
            Cell::new(window.organization_id),
            Cell::new(window.processing_priority),
            Cell::new(window.current_window_end_date.format("%Y-%m-%d")),
            Cell::new(
                window
                    .last_processed_at
                    .map(|at| at.humanize())
                    .unwrap_or_else(|| "Never".to_string()),
            ),
        ]);
    }
    println!("{table}");
}

pub fn display_rules(rules: &[RecurrenceRule]) {
    if rules.is_empty() {
        println!("No series found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Rule", "Series", "RRULE", "Timezone", "Starts", "Generated", "Active"]);
    for rule in rules {
        let active = if rule.is_active {
            Cell::new("Yes").fg(Color::Green)
        } else {
            Cell::new("No").fg(Color::DarkGrey)
        };
        let generated = match rule.count {
            Some(count) => format!("{}/{}", rule.generated_count, count),
            None => rule.generated_count.to_string(),
        };
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(short_id(&rule.original_series_id)),
            Cell::new(&rule.rrule),
            Cell::new(&rule.timezone),
            Cell::new(local_time(rule.start_at, &rule.timezone)),
            Cell::new(generated),
            active,
        ]);
    }
    println!("{table}");
}
