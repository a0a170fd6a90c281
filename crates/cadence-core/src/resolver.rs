//! Read-time merge of materialized instances with their templates and exceptions.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{EventException, EventTemplate, RecurringEventInstance, ResolvedInstance};

/// Builds the view of one instance.
///
/// Without an exception the instance inherits every descriptive field from the
/// template as it is now. With an exception, each field present in the diff
/// replaces the inherited value. Never writes anything.
pub fn resolve(
    instance: &RecurringEventInstance,
    template: &EventTemplate,
    exception: Option<&EventException>,
) -> ResolvedInstance {
    let mut resolved = ResolvedInstance {
        id: instance.id,
        base_template_id: instance.base_template_id,
        recurrence_rule_id: instance.recurrence_rule_id,
        original_series_id: instance.original_series_id,
        organization_id: instance.organization_id,
        original_instance_start_time: instance.original_instance_start_time,
        start_at: instance.actual_start_time,
        end_at: instance.actual_end_time,
        sequence_number: instance.sequence_number,
        total_count: instance.total_count,
        is_cancelled: instance.is_cancelled,
        version: instance.version,
        name: template.name.clone(),
        description: template.description.clone(),
        location: template.location.clone(),
        all_day: template.all_day,
        is_public: template.is_public,
        is_registerable: template.is_registerable,
        is_invite_only: template.is_invite_only,
        has_exception: false,
        applied_exception: None,
        exception_updated_at: None,
    };

    let Some(exception) = exception else {
        return resolved;
    };
    let diff = &exception.exception_data.0;

    if let Some(name) = &diff.name {
        resolved.name = name.clone();
    }
    if let Some(description) = &diff.description {
        resolved.description = description.clone();
    }
    if let Some(location) = &diff.location {
        resolved.location = location.clone();
    }
    if let Some(all_day) = diff.all_day {
        resolved.all_day = all_day;
    }
    if let Some(is_public) = diff.is_public {
        resolved.is_public = is_public;
    }
    if let Some(is_registerable) = diff.is_registerable {
        resolved.is_registerable = is_registerable;
    }
    if let Some(is_invite_only) = diff.is_invite_only {
        resolved.is_invite_only = is_invite_only;
    }
    if let Some(start_at) = diff.start_at {
        resolved.start_at = start_at;
    }
    if let Some(end_at) = diff.end_at {
        resolved.end_at = end_at;
    }
    if let Some(is_cancelled) = diff.is_cancelled {
        resolved.is_cancelled = is_cancelled;
    }

    resolved.has_exception = true;
    resolved.applied_exception = Some(diff.clone());
    resolved.exception_updated_at = Some(exception.updated_at);
    resolved
}

/// Resolves a batch in input order. Instances whose template is missing are
/// skipped and logged.
pub fn resolve_all(
    instances: &[RecurringEventInstance],
    templates: &HashMap<Uuid, EventTemplate>,
    exceptions: &HashMap<Uuid, EventException>,
) -> Vec<ResolvedInstance> {
    instances
        .iter()
        .filter_map(|instance| {
            let Some(template) = templates.get(&instance.base_template_id) else {
                tracing::warn!(
                    instance_id = %instance.id,
                    template_id = %instance.base_template_id,
                    "template missing for instance, skipping"
                );
                return None;
            };
            Some(resolve(instance, template, exceptions.get(&instance.id)))
        })
        .collect()
}
