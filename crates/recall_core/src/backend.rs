//! Storage backend traits.
//!
//! Backends own the durable tables for events, entity snapshots, the
//! derived due-component index, attachments, and bookkeeping metadata.
//! The [`crate::Database`] facade performs dedup and reducer folds; the
//! backend's job is atomic persistence and the four query shapes.
//!
//! # Invariants
//!
//! - [`StorageBackend::apply_entity_update`] writes the event rows, the
//!   snapshot, and the derived index rows in **one** transaction; a crash or
//!   concurrent reader never observes a torn update.
//! - The derived index rows for a task equal exactly the component keys of
//!   its snapshot, filtered to non-deleted tasks, after every write.
//! - Entities list in stable ascending insertion order (internal row), not
//!   ID order; events list in ascending insertion order, which matches
//!   event-ID order for locally generated IDs.
//! - Attachment payloads are immutable: a second put under the same ID is a
//!   no-op.

use crate::entity::{AttachmentMimeType, Entity, EntityType};
use crate::error::CoreResult;
use crate::event::Event;
use crate::ids::{EntityId, EventId};
use std::collections::{BTreeMap, HashSet};

/// One atomic entity write: the newly applied events plus the snapshot they
/// fold to.
#[derive(Debug, Clone)]
pub struct EntityUpdate {
    /// The resulting snapshot.
    pub entity: Entity,
    /// The events applied in this update, in ascending event-ID order.
    pub events: Vec<Event>,
    /// ID of the last event folded into the snapshot.
    pub last_event_id: EventId,
    /// Timestamp asserted by that event.
    pub last_event_timestamp_millis: i64,
}

/// Comparison operator for index predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
}

impl CmpOp {
    /// SQL spelling of the operator.
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
        }
    }

    /// Evaluates the operator on two values.
    #[must_use]
    pub fn matches(&self, left: i64, right: i64) -> bool {
        match self {
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Eq => left == right,
            CmpOp::Ge => left >= right,
            CmpOp::Gt => left > right,
        }
    }
}

/// Single-field comparison against the derived due-component index. A task
/// matches when any of its live components satisfies the comparison.
#[derive(Debug, Clone, Copy)]
pub struct DuePredicate {
    /// Comparison operator.
    pub op: CmpOp,
    /// Right-hand side, a millisecond timestamp.
    pub due_timestamp_millis: i64,
}

/// Query over entity snapshots.
#[derive(Debug, Clone)]
pub struct EntityQuery {
    /// Entity kind to return.
    pub entity_type: EntityType,
    /// Maximum number of rows.
    pub limit: usize,
    /// Exclusive pagination cursor: return entities inserted after this one.
    pub after_id: Option<EntityId>,
    /// Optional derived-index predicate.
    pub predicate: Option<DuePredicate>,
}

impl EntityQuery {
    /// Query for all entities of a kind, up to `limit`.
    #[must_use]
    pub fn all(entity_type: EntityType, limit: usize) -> Self {
        Self {
            entity_type,
            limit,
            after_id: None,
            predicate: None,
        }
    }
}

/// Query over the event log.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Maximum number of rows.
    pub limit: usize,
    /// Exclusive cursor: return events appended after this one.
    pub after_id: Option<EventId>,
    /// Restrict to events targeting one entity.
    pub entity_id: Option<EntityId>,
}

impl EventQuery {
    /// Query for the whole log, up to `limit`.
    #[must_use]
    pub fn all(limit: usize) -> Self {
        Self {
            limit,
            after_id: None,
            entity_id: None,
        }
    }
}

/// Durable storage for the event log, snapshots, derived index, and
/// metadata.
pub trait StorageBackend: Send + Sync {
    /// Returns the subset of `ids` already present in the event log.
    fn existing_event_ids(&self, ids: &[EventId]) -> CoreResult<HashSet<EventId>>;

    /// Bulk point lookup of entity snapshots. Missing IDs are simply absent
    /// from the result.
    fn get_entities(&self, ids: &[EntityId]) -> CoreResult<Vec<Entity>>;

    /// The ID of the last event folded into each entity's snapshot. IDs
    /// without a snapshot are absent from the map.
    fn entity_heads(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, EventId>>;

    /// Lists entity snapshots per the query's ordering contract.
    fn list_entities(&self, query: &EntityQuery) -> CoreResult<Vec<Entity>>;

    /// Lists events in ascending insertion order.
    fn list_events(&self, query: &EventQuery) -> CoreResult<Vec<Event>>;

    /// Atomically appends the update's events, upserts the snapshot, and
    /// rewrites the task's derived index rows.
    fn apply_entity_update(&self, update: &EntityUpdate) -> CoreResult<()>;

    /// Reads a bookkeeping value.
    fn get_metadata(&self, key: &str) -> CoreResult<Option<String>>;

    /// Writes a bookkeeping value.
    fn set_metadata(&self, key: &str, value: &str) -> CoreResult<()>;

    /// Rows currently present in the derived due-component index for one
    /// task, as `(component_id, due_timestamp_millis)` pairs. Primarily a
    /// consistency-check surface.
    fn derived_components(&self, task_id: &EntityId) -> CoreResult<Vec<(String, i64)>>;

    /// Releases backend resources.
    fn close(&self) -> CoreResult<()>;
}

/// Content-addressed binary blob storage, independent of the event log.
pub trait AttachmentStore: Send + Sync {
    /// Stores a payload under an ID. Payloads are immutable: when the ID is
    /// already present the call is a no-op.
    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> CoreResult<()>;

    /// Reads a payload, or `None` when absent.
    fn get_attachment(&self, id: &EntityId)
        -> CoreResult<Option<(AttachmentMimeType, Vec<u8>)>>;

    /// Returns whether a payload exists for the ID.
    fn has_attachment(&self, id: &EntityId) -> CoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_op_sql_and_eval_agree() {
        let cases = [
            (CmpOp::Lt, "<"),
            (CmpOp::Le, "<="),
            (CmpOp::Eq, "="),
            (CmpOp::Ge, ">="),
            (CmpOp::Gt, ">"),
        ];
        for (op, sql) in cases {
            assert_eq!(op.sql(), sql);
        }
        assert!(CmpOp::Le.matches(5, 5));
        assert!(!CmpOp::Lt.matches(5, 5));
        assert!(CmpOp::Gt.matches(6, 5));
    }
}
