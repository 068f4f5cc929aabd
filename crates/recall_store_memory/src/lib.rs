//! # Recall in-memory backend
//!
//! A non-durable [`StorageBackend`] and [`AttachmentStore`] with the same
//! observable semantics as the SQLite backend: insertion-ordered listings,
//! exclusive cursors, an explicitly maintained due-component index, and
//! immutable attachments. Everything lives behind one `RwLock`, so each
//! entity update is atomic with respect to readers.
//!
//! Intended for tests, sync simulations, and ephemeral stores.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use parking_lot::RwLock;
use recall_core::{
    AttachmentMimeType, AttachmentStore, CoreError, CoreResult, Entity, EntityId, EntityQuery,
    EntityUpdate, Event, EventId, EventQuery, StorageBackend,
};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
struct Inner {
    /// Append-only log, insertion order.
    events: Vec<Event>,
    /// Event ID to position in `events`.
    event_index: HashMap<EventId, usize>,
    /// Entity IDs in first-write order, the listing order.
    entity_order: Vec<EntityId>,
    snapshots: HashMap<EntityId, Entity>,
    /// Last folded event ID per entity.
    heads: HashMap<EntityId, EventId>,
    /// Live `(component_id, due_timestamp_millis)` rows per task.
    derived: HashMap<EntityId, BTreeMap<String, i64>>,
    attachments: HashMap<EntityId, (AttachmentMimeType, Vec<u8>)>,
    metadata: BTreeMap<String, String>,
}

/// In-memory store contents, dropped when the backend is dropped.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn entity_position(&self, id: &EntityId) -> CoreResult<usize> {
        self.entity_order
            .iter()
            .position(|e| e == id)
            .ok_or_else(|| CoreError::invalid_operation(format!("unknown entity cursor {id}")))
    }
}

impl StorageBackend for MemoryBackend {
    fn existing_event_ids(&self, ids: &[EventId]) -> CoreResult<HashSet<EventId>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter(|id| inner.event_index.contains_key(id))
            .cloned()
            .collect())
    }

    fn get_entities(&self, ids: &[EntityId]) -> CoreResult<Vec<Entity>> {
        let inner = self.inner.read();
        let wanted: HashSet<&EntityId> = ids.iter().collect();
        Ok(inner
            .entity_order
            .iter()
            .filter(|id| wanted.contains(id))
            .filter_map(|id| inner.snapshots.get(id).cloned())
            .collect())
    }

    fn entity_heads(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, EventId>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.heads.get(id).map(|head| (id.clone(), head.clone())))
            .collect())
    }

    fn list_entities(&self, query: &EntityQuery) -> CoreResult<Vec<Entity>> {
        let inner = self.inner.read();
        let start = match &query.after_id {
            None => 0,
            Some(id) => inner.entity_position(id)? + 1,
        };

        let mut out = Vec::new();
        for id in &inner.entity_order[start..] {
            if out.len() >= query.limit {
                break;
            }
            let Some(entity) = inner.snapshots.get(id) else {
                continue;
            };
            if entity.entity_type() != query.entity_type {
                continue;
            }
            if let Some(predicate) = &query.predicate {
                let matches = inner.derived.get(id).is_some_and(|components| {
                    components
                        .values()
                        .any(|due| predicate.op.matches(*due, predicate.due_timestamp_millis))
                });
                if !matches {
                    continue;
                }
            }
            out.push(entity.clone());
        }
        Ok(out)
    }

    fn list_events(&self, query: &EventQuery) -> CoreResult<Vec<Event>> {
        let inner = self.inner.read();
        let start = match &query.after_id {
            None => 0,
            Some(id) => {
                *inner.event_index.get(id).ok_or_else(|| {
                    CoreError::invalid_operation(format!("unknown event cursor {id}"))
                })? + 1
            }
        };

        let mut out = Vec::new();
        for event in &inner.events[start..] {
            if out.len() >= query.limit {
                break;
            }
            if let Some(entity_id) = &query.entity_id {
                if &event.entity_id != entity_id {
                    continue;
                }
            }
            out.push(event.clone());
        }
        Ok(out)
    }

    fn apply_entity_update(&self, update: &EntityUpdate) -> CoreResult<()> {
        let mut inner = self.inner.write();

        for event in &update.events {
            if inner.event_index.contains_key(&event.id) {
                return Err(CoreError::storage(format!(
                    "duplicate event id {}",
                    event.id
                )));
            }
        }
        for event in &update.events {
            let position = inner.events.len();
            inner.event_index.insert(event.id.clone(), position);
            inner.events.push(event.clone());
        }

        let entity_id = update.entity.id().clone();
        if !inner.snapshots.contains_key(&entity_id) {
            inner.entity_order.push(entity_id.clone());
        }
        inner
            .snapshots
            .insert(entity_id.clone(), update.entity.clone());
        inner
            .heads
            .insert(entity_id.clone(), update.last_event_id.clone());

        inner.derived.remove(&entity_id);
        if let Entity::Task(task) = &update.entity {
            if !task.is_deleted {
                let rows = task
                    .component_states
                    .iter()
                    .map(|(component_id, state)| {
                        (component_id.clone(), state.due_timestamp_millis)
                    })
                    .collect();
                inner.derived.insert(entity_id, rows);
            }
        }
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.inner.read().metadata.get(key).cloned())
    }

    fn set_metadata(&self, key: &str, value: &str) -> CoreResult<()> {
        self.inner
            .write()
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn derived_components(&self, task_id: &EntityId) -> CoreResult<Vec<(String, i64)>> {
        let inner = self.inner.read();
        Ok(inner
            .derived
            .get(task_id)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }

    fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

impl AttachmentStore for MemoryBackend {
    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner
            .attachments
            .entry(id.clone())
            .or_insert_with(|| (mime_type, contents.to_vec()));
        Ok(())
    }

    fn get_attachment(
        &self,
        id: &EntityId,
    ) -> CoreResult<Option<(AttachmentMimeType, Vec<u8>)>> {
        Ok(self.inner.read().attachments.get(id).cloned())
    }

    fn has_attachment(&self, id: &EntityId) -> CoreResult<bool> {
        Ok(self.inner.read().attachments.contains_key(id))
    }
}
