//! Entity snapshots: tasks and attachment references.
//!
//! An entity is never mutated directly. Snapshots are computed by folding
//! [`crate::reduce`] over the entity's events and are serialized with the
//! same camelCase wire shape used for persistence and sync.

use crate::ids::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The kind of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A schedulable prompt with one or more components.
    #[serde(rename = "task")]
    Task,
    /// A reference to a binary attachment stored outside the event log.
    #[serde(rename = "attachmentReference")]
    AttachmentReference,
}

impl EntityType {
    /// Wire name of the entity type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::AttachmentReference => "attachmentReference",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A materialized entity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Entity {
    /// A task snapshot.
    #[serde(rename = "task")]
    Task(Task),
    /// An attachment reference snapshot.
    #[serde(rename = "attachmentReference")]
    AttachmentReference(AttachmentReference),
}

impl Entity {
    /// Returns the entity's stable identifier.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        match self {
            Entity::Task(t) => &t.id,
            Entity::AttachmentReference(a) => &a.id,
        }
    }

    /// Returns the entity's kind.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Task(_) => EntityType::Task,
            Entity::AttachmentReference(_) => EntityType::AttachmentReference,
        }
    }

    /// Returns the creation timestamp in milliseconds.
    #[must_use]
    pub fn created_at_timestamp_millis(&self) -> i64 {
        match self {
            Entity::Task(t) => t.created_at_timestamp_millis,
            Entity::AttachmentReference(a) => a.created_at_timestamp_millis,
        }
    }

    /// Returns the task snapshot, if this entity is a task.
    #[must_use]
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Entity::Task(t) => Some(t),
            Entity::AttachmentReference(_) => None,
        }
    }
}

/// A task: a prompt with independently schedulable components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier.
    pub id: EntityId,
    /// Creation timestamp (from the ingest event).
    pub created_at_timestamp_millis: i64,
    /// Content and layout.
    pub spec: TaskSpec,
    /// Where the task came from, if known.
    pub provenance: Option<TaskProvenance>,
    /// Per-component scheduling state, keyed by component ID.
    pub component_states: BTreeMap<String, TaskComponentState>,
    /// Soft-deletion flag; reversible by a further event.
    pub is_deleted: bool,
    /// Open string-keyed metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Scheduling state for one task component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskComponentState {
    /// When the component was created.
    pub created_at_timestamp_millis: i64,
    /// Timestamp of the last recorded repetition, if any.
    pub last_repetition_timestamp_millis: Option<i64>,
    /// When the component is next due for review.
    pub due_timestamp_millis: i64,
    /// Current scheduling interval.
    pub interval_millis: i64,
}

/// Task content plus content-type-specific layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentType")]
pub enum TaskSpec {
    /// Question/answer prompt with a single component.
    #[serde(rename = "qa", rename_all = "camelCase")]
    Qa {
        /// Question text.
        body: String,
        /// Answer text.
        answer: String,
    },
    /// Cloze deletion prompt; each component is one set of blanked ranges.
    #[serde(rename = "cloze", rename_all = "camelCase")]
    Cloze {
        /// Full text the ranges index into.
        body: String,
        /// Blanked ranges per component, keyed by component ID.
        components: BTreeMap<String, Vec<ClozeRange>>,
    },
    /// Plain single-component prompt.
    #[serde(rename = "plain", rename_all = "camelCase")]
    Plain {
        /// Prompt text.
        body: String,
    },
}

/// Component ID used by single-component content types.
pub(crate) const MAIN_COMPONENT_ID: &str = "main";

impl TaskSpec {
    /// Component IDs this spec defines, in stable order.
    #[must_use]
    pub fn component_ids(&self) -> Vec<String> {
        match self {
            TaskSpec::Qa { .. } | TaskSpec::Plain { .. } => vec![MAIN_COMPONENT_ID.to_string()],
            TaskSpec::Cloze { components, .. } => components.keys().cloned().collect(),
        }
    }

    /// The prompt body text.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            TaskSpec::Qa { body, .. }
            | TaskSpec::Cloze { body, .. }
            | TaskSpec::Plain { body } => body,
        }
    }
}

/// A contiguous blanked range within a cloze body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClozeRange {
    /// Byte index of the first blanked character.
    pub start_index: usize,
    /// Number of blanked bytes.
    pub length: usize,
}

/// Source reference for an ingested task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProvenance {
    /// Opaque identifier within the source (e.g. a note ID).
    pub identifier: String,
    /// Human-readable source title.
    pub title: Option<String>,
    /// Source URL, if any.
    pub url: Option<String>,
}

/// A reference to a binary attachment. The payload itself lives in the
/// attachment store under the same ID and is immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentReference {
    /// Stable identifier, shared with the stored blob.
    pub id: EntityId,
    /// Creation timestamp (from the ingest event).
    pub created_at_timestamp_millis: i64,
    /// MIME type of the stored payload.
    pub mime_type: AttachmentMimeType,
}

/// Supported attachment MIME types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentMimeType {
    /// `image/png`
    #[serde(rename = "image/png")]
    Png,
    /// `image/jpeg`
    #[serde(rename = "image/jpeg")]
    Jpeg,
    /// `image/svg+xml`
    #[serde(rename = "image/svg+xml")]
    Svg,
}

impl AttachmentMimeType {
    /// The MIME type string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentMimeType::Png => "image/png",
            AttachmentMimeType::Jpeg => "image/jpeg",
            AttachmentMimeType::Svg => "image/svg+xml",
        }
    }

    /// Parses a MIME type string.
    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "image/png" => Some(AttachmentMimeType::Png),
            "image/jpeg" => Some(AttachmentMimeType::Jpeg),
            "image/svg+xml" => Some(AttachmentMimeType::Svg),
            _ => None,
        }
    }
}

impl fmt::Display for AttachmentMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
