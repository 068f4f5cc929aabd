//! Events: immutable, uniquely identified facts that mutate one entity.
//!
//! The wire shape is `{id, entityID, type, timestampMillis, ...}` with the
//! type-specific fields flattened alongside the common ones. Events are
//! append-only and never edited; `timestamp_millis` is client-asserted and
//! is *not* used for ordering (event IDs are).

use crate::entity::{AttachmentMimeType, EntityType, TaskProvenance, TaskSpec};
use crate::ids::{EntityId, EventId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An event in the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Globally unique, time-ordered identifier.
    pub id: EventId,
    /// The entity this event mutates.
    #[serde(rename = "entityID")]
    pub entity_id: EntityId,
    /// Client-asserted creation time. Untrusted for ordering.
    pub timestamp_millis: i64,
    /// Type-specific payload, flattened into the wire object.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// The entity kind this event targets.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        // Spelled out so adding an event kind forces a decision here.
        match self.payload {
            EventPayload::TaskIngest { .. }
            | EventPayload::TaskRepetition { .. }
            | EventPayload::TaskReschedule { .. }
            | EventPayload::TaskUpdateDeleted { .. }
            | EventPayload::TaskUpdateSpec { .. }
            | EventPayload::TaskUpdateProvenance { .. }
            | EventPayload::TaskUpdateMetadata { .. } => EntityType::Task,
            EventPayload::AttachmentIngest { .. } => EntityType::AttachmentReference,
        }
    }

    /// Wire name of the event kind.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}

/// Type-specific event payloads, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    /// Creates a task. Re-ingesting a known task is a no-op.
    #[serde(rename_all = "camelCase")]
    TaskIngest {
        /// Initial content.
        spec: TaskSpec,
        /// Source reference, if any.
        provenance: Option<TaskProvenance>,
        /// Initial metadata entries.
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    /// Records a review outcome for one component. The schedule fields are
    /// the output of the (external) scheduling function, carried as opaque
    /// state.
    #[serde(rename_all = "camelCase")]
    TaskRepetition {
        /// The reviewed component.
        #[serde(rename = "componentID")]
        component_id: String,
        /// What happened in the review.
        outcome: RepetitionOutcome,
        /// Scheduler output applied to the component.
        schedule: ComponentSchedule,
    },
    /// Administrative override of one component's schedule; not a review.
    #[serde(rename_all = "camelCase")]
    TaskReschedule {
        /// The rescheduled component.
        #[serde(rename = "componentID")]
        component_id: String,
        /// New due timestamp.
        new_due_timestamp_millis: i64,
        /// New interval, if changed.
        new_interval_millis: Option<i64>,
    },
    /// Sets or clears the soft-deletion flag.
    #[serde(rename_all = "camelCase")]
    TaskUpdateDeleted {
        /// New deletion state.
        is_deleted: bool,
    },
    /// Replaces the task spec.
    #[serde(rename_all = "camelCase")]
    TaskUpdateSpec {
        /// Replacement spec.
        spec: TaskSpec,
    },
    /// Replaces the provenance.
    #[serde(rename_all = "camelCase")]
    TaskUpdateProvenance {
        /// Replacement provenance (or none).
        provenance: Option<TaskProvenance>,
    },
    /// Merges entries into the metadata map (existing keys are overwritten,
    /// other keys are untouched).
    #[serde(rename_all = "camelCase")]
    TaskUpdateMetadata {
        /// Entries to merge.
        entries: BTreeMap<String, String>,
    },
    /// Creates an attachment reference. First write wins.
    #[serde(rename_all = "camelCase")]
    AttachmentIngest {
        /// MIME type of the stored payload.
        mime_type: AttachmentMimeType,
    },
}

impl EventPayload {
    /// Wire name of the event kind.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::TaskIngest { .. } => "taskIngest",
            EventPayload::TaskRepetition { .. } => "taskRepetition",
            EventPayload::TaskReschedule { .. } => "taskReschedule",
            EventPayload::TaskUpdateDeleted { .. } => "taskUpdateDeleted",
            EventPayload::TaskUpdateSpec { .. } => "taskUpdateSpec",
            EventPayload::TaskUpdateProvenance { .. } => "taskUpdateProvenance",
            EventPayload::TaskUpdateMetadata { .. } => "taskUpdateMetadata",
            EventPayload::AttachmentIngest { .. } => "attachmentIngest",
        }
    }
}

/// Review outcome recorded by a repetition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepetitionOutcome {
    /// The prompt was recalled successfully.
    Remembered,
    /// The prompt was not recalled.
    Forgotten,
}

/// Scheduler output carried on repetition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSchedule {
    /// Next due timestamp.
    pub due_timestamp_millis: i64,
    /// New interval.
    pub interval_millis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OrderedIdGenerator;

    fn ingest_event() -> Event {
        let mut gen = OrderedIdGenerator::from_seed(1);
        Event {
            id: gen.generate_at(1_700_000_000_000),
            entity_id: EntityId::random(),
            timestamp_millis: 1_700_000_000_000,
            payload: EventPayload::TaskIngest {
                spec: TaskSpec::Qa {
                    body: "q".into(),
                    answer: "a".into(),
                },
                provenance: None,
                metadata: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn wire_shape_has_flat_type_tag() {
        let event = ingest_event();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taskIngest");
        assert!(json["entityID"].is_string());
        assert!(json["timestampMillis"].is_i64());
        assert_eq!(json["spec"]["contentType"], "qa");
        // No nested payload object: fields sit next to the common ones.
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn repetition_component_id_wire_name() {
        let mut event = ingest_event();
        event.payload = EventPayload::TaskRepetition {
            component_id: "main".into(),
            outcome: RepetitionOutcome::Remembered,
            schedule: ComponentSchedule {
                due_timestamp_millis: 1_700_000_500_000,
                interval_millis: 500_000,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["componentID"], "main");
        assert_eq!(json["outcome"], "remembered");
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let raw = r#"{
            "id": "abcdefghijklmnopqrstuv",
            "entityID": "abcdefghijklmnopqrstuv",
            "timestampMillis": 1,
            "type": "taskExplode"
        }"#;
        let parsed: Result<Event, _> = serde_json::from_str(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn event_roundtrip() {
        let event = ingest_event();
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn attachment_ingest_targets_attachment_entity() {
        let mut event = ingest_event();
        assert_eq!(event.entity_type(), EntityType::Task);

        event.payload = EventPayload::TaskUpdateDeleted { is_deleted: true };
        assert_eq!(event.entity_type(), EntityType::Task);
        event.payload = EventPayload::TaskUpdateMetadata {
            entries: BTreeMap::new(),
        };
        assert_eq!(event.entity_type(), EntityType::Task);

        event.payload = EventPayload::AttachmentIngest {
            mime_type: AttachmentMimeType::Png,
        };
        assert_eq!(event.entity_type(), EntityType::AttachmentReference);
    }
}
