//! Ingestion-boundary validation.
//!
//! Typed deserialization already enforces the wire schema (an unknown event
//! `type` fails there); this module adds the semantic field checks, and
//! reports every problem in a batch rather than stopping at the first.
//! Rejected events never enter the log.

use crate::entity::TaskSpec;
use crate::event::{Event, EventPayload};

/// Maximum allowed serialized size for a single event payload.
pub const MAX_EVENT_BYTES: usize = 1_048_576;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Wire path of the offending field (e.g. `events[3].componentID`).
    pub field: String,
    /// Human-readable description of what is wrong.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates one event, returning every issue found.
#[must_use]
pub fn validate_event(event: &Event) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    check_event(event, "", &mut issues);
    issues
}

/// Validates a batch, prefixing issues with the event's index.
#[must_use]
pub fn validate_events(events: &[Event]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (index, event) in events.iter().enumerate() {
        check_event(event, &format!("events[{index}]."), &mut issues);
    }
    issues
}

fn check_event(event: &Event, prefix: &str, issues: &mut Vec<ValidationIssue>) {
    if event.timestamp_millis <= 0 {
        issues.push(ValidationIssue::new(
            format!("{prefix}timestampMillis"),
            "must be a positive millisecond timestamp",
        ));
    }

    match serde_json::to_vec(event) {
        Ok(bytes) if bytes.len() > MAX_EVENT_BYTES => {
            issues.push(ValidationIssue::new(
                format!("{prefix}type"),
                format!("serialized event exceeds {MAX_EVENT_BYTES} bytes"),
            ));
        }
        _ => {}
    }

    match &event.payload {
        EventPayload::TaskIngest { spec, .. } | EventPayload::TaskUpdateSpec { spec } => {
            check_spec(spec, prefix, issues);
        }
        EventPayload::TaskRepetition {
            component_id,
            schedule,
            ..
        } => {
            check_component_id(component_id, prefix, issues);
            if schedule.due_timestamp_millis <= 0 {
                issues.push(ValidationIssue::new(
                    format!("{prefix}schedule.dueTimestampMillis"),
                    "must be a positive millisecond timestamp",
                ));
            }
            if schedule.interval_millis < 0 {
                issues.push(ValidationIssue::new(
                    format!("{prefix}schedule.intervalMillis"),
                    "must not be negative",
                ));
            }
        }
        EventPayload::TaskReschedule {
            component_id,
            new_due_timestamp_millis,
            new_interval_millis,
        } => {
            check_component_id(component_id, prefix, issues);
            if *new_due_timestamp_millis <= 0 {
                issues.push(ValidationIssue::new(
                    format!("{prefix}newDueTimestampMillis"),
                    "must be a positive millisecond timestamp",
                ));
            }
            if new_interval_millis.is_some_and(|interval| interval < 0) {
                issues.push(ValidationIssue::new(
                    format!("{prefix}newIntervalMillis"),
                    "must not be negative",
                ));
            }
        }
        EventPayload::TaskUpdateMetadata { entries } => {
            if entries.keys().any(|key| key.is_empty()) {
                issues.push(ValidationIssue::new(
                    format!("{prefix}entries"),
                    "metadata keys must not be empty",
                ));
            }
        }
        EventPayload::TaskUpdateDeleted { .. }
        | EventPayload::TaskUpdateProvenance { .. }
        | EventPayload::AttachmentIngest { .. } => {}
    }
}

fn check_component_id(component_id: &str, prefix: &str, issues: &mut Vec<ValidationIssue>) {
    if component_id.is_empty() {
        issues.push(ValidationIssue::new(
            format!("{prefix}componentID"),
            "must not be empty",
        ));
    }
}

fn check_spec(spec: &TaskSpec, prefix: &str, issues: &mut Vec<ValidationIssue>) {
    if spec.body().is_empty() {
        issues.push(ValidationIssue::new(
            format!("{prefix}spec.body"),
            "must not be empty",
        ));
    }
    if let TaskSpec::Cloze { body, components } = spec {
        if components.is_empty() {
            issues.push(ValidationIssue::new(
                format!("{prefix}spec.components"),
                "cloze spec needs at least one component",
            ));
        }
        for (component_id, ranges) in components {
            if component_id.is_empty() {
                issues.push(ValidationIssue::new(
                    format!("{prefix}spec.components"),
                    "component IDs must not be empty",
                ));
            }
            for (i, range) in ranges.iter().enumerate() {
                if range.length == 0 {
                    issues.push(ValidationIssue::new(
                        format!("{prefix}spec.components.{component_id}[{i}].length"),
                        "range must not be empty",
                    ));
                } else if range.start_index + range.length > body.len() {
                    issues.push(ValidationIssue::new(
                        format!("{prefix}spec.components.{component_id}[{i}]"),
                        "range extends past the end of the body",
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ClozeRange;
    use crate::event::{ComponentSchedule, RepetitionOutcome};
    use crate::ids::{EntityId, OrderedIdGenerator};
    use std::collections::BTreeMap;

    fn event(payload: EventPayload) -> Event {
        let mut gen = OrderedIdGenerator::from_seed(5);
        Event {
            id: gen.generate_at(1_700_000_000_000),
            entity_id: EntityId::random(),
            timestamp_millis: 1_700_000_000_000,
            payload,
        }
    }

    #[test]
    fn valid_ingest_passes() {
        let e = event(EventPayload::TaskIngest {
            spec: TaskSpec::Qa {
                body: "q".into(),
                answer: "a".into(),
            },
            provenance: None,
            metadata: BTreeMap::new(),
        });
        assert!(validate_event(&e).is_empty());
    }

    #[test]
    fn empty_body_is_flagged() {
        let e = event(EventPayload::TaskIngest {
            spec: TaskSpec::Plain { body: String::new() },
            provenance: None,
            metadata: BTreeMap::new(),
        });
        let issues = validate_event(&e);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "spec.body");
    }

    #[test]
    fn bad_timestamp_and_component_reported_together() {
        let mut e = event(EventPayload::TaskRepetition {
            component_id: String::new(),
            outcome: RepetitionOutcome::Remembered,
            schedule: ComponentSchedule {
                due_timestamp_millis: 10,
                interval_millis: 5,
            },
        });
        e.timestamp_millis = 0;
        let issues = validate_event(&e);
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"timestampMillis"));
        assert!(fields.contains(&"componentID"));
    }

    #[test]
    fn cloze_range_bounds_checked() {
        let e = event(EventPayload::TaskIngest {
            spec: TaskSpec::Cloze {
                body: "short".into(),
                components: BTreeMap::from([(
                    "0".to_string(),
                    vec![ClozeRange {
                        start_index: 3,
                        length: 10,
                    }],
                )]),
            },
            provenance: None,
            metadata: BTreeMap::new(),
        });
        let issues = validate_event(&e);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].field.starts_with("spec.components.0[0]"));
    }

    #[test]
    fn batch_issues_carry_event_index() {
        let good = event(EventPayload::TaskUpdateDeleted { is_deleted: true });
        let mut bad = event(EventPayload::TaskUpdateDeleted { is_deleted: true });
        bad.timestamp_millis = -1;
        let issues = validate_events(&[good, bad]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "events[1].timestampMillis");
    }
}
