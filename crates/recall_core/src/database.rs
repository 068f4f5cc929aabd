//! Database facade: event ingestion and queries.

use crate::backend::{
    AttachmentStore, CmpOp, DuePredicate, EntityQuery, EntityUpdate, EventQuery, StorageBackend,
};
use crate::entity::{AttachmentMimeType, Entity, EntityType, Task};
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::ids::{EntityId, EventId};
use crate::reducer::reduce;
use crate::validate::validate_events;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One newly applied event and the snapshot that resulted from it.
#[derive(Debug, Clone)]
pub struct EventApplication {
    /// The event that was appended.
    pub event: Event,
    /// The entity snapshot immediately after folding this event.
    pub entity: Entity,
}

/// The main store handle.
///
/// `Database` orchestrates event ingestion - validation, dedup, reducer
/// folds, transactional persistence - over a pluggable [`StorageBackend`],
/// and answers entity/event queries. Writes are serialized by the caller
/// (single-writer-per-store discipline); reads may run concurrently.
///
/// # Example
///
/// ```rust,ignore
/// use recall_core::Database;
/// use recall_store_sqlite::SqliteBackend;
/// use std::sync::Arc;
///
/// let backend = Arc::new(SqliteBackend::open(path)?);
/// let db = Database::new(backend);
/// let applied = db.put_events(events)?;
/// ```
pub struct Database {
    backend: Arc<dyn StorageBackend>,
    attachments: Arc<dyn AttachmentStore>,
    is_open: RwLock<bool>,
}

impl Database {
    /// Creates a database over a backend that also stores attachments.
    pub fn new<B>(backend: Arc<B>) -> Self
    where
        B: StorageBackend + AttachmentStore + 'static,
    {
        Self {
            backend: backend.clone(),
            attachments: backend,
            is_open: RwLock::new(true),
        }
    }

    /// Creates a database with a separate attachment store.
    pub fn with_parts(
        backend: Arc<dyn StorageBackend>,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            backend,
            attachments,
            is_open: RwLock::new(true),
        }
    }

    /// Ingests a batch of events.
    ///
    /// Events failing validation reject the call before anything touches the
    /// log. Events whose IDs are already present contribute nothing (dedup
    /// is by ID, not content). The remainder are grouped by entity, folded
    /// through the reducer in ascending event-ID order on top of the current
    /// snapshot, and persisted one transaction per entity. When an incoming
    /// event's ID precedes the snapshot's last folded ID (it arrived after
    /// later events were already folded), the entity is instead re-folded
    /// from its full log merged with the new events, so the snapshot is
    /// always the fold of every known event in ID order.
    ///
    /// Returns only the newly applied `(event, resulting snapshot)` pairs;
    /// the result can be shorter than the input.
    pub fn put_events(&self, events: Vec<Event>) -> CoreResult<Vec<EventApplication>> {
        self.ensure_open()?;

        let issues = validate_events(&events);
        if !issues.is_empty() {
            return Err(CoreError::validation(issues));
        }

        let ids: Vec<EventId> = events.iter().map(|e| e.id.clone()).collect();
        let known = self.backend.existing_event_ids(&ids)?;

        // Dedup against the log and within the batch itself.
        let mut seen: HashSet<EventId> = HashSet::new();
        let mut by_entity: BTreeMap<EntityId, Vec<Event>> = BTreeMap::new();
        for event in events {
            if known.contains(&event.id) || !seen.insert(event.id.clone()) {
                continue;
            }
            by_entity.entry(event.entity_id.clone()).or_default().push(event);
        }

        if by_entity.is_empty() {
            return Ok(Vec::new());
        }

        let entity_ids: Vec<EntityId> = by_entity.keys().cloned().collect();
        let mut snapshots: BTreeMap<EntityId, Entity> = self
            .backend
            .get_entities(&entity_ids)?
            .into_iter()
            .map(|entity| (entity.id().clone(), entity))
            .collect();
        let mut heads = self.backend.entity_heads(&entity_ids)?;

        let mut applied = Vec::new();
        for (entity_id, mut group) in by_entity {
            group.sort_by(|a, b| a.id.cmp(&b.id));

            // An incoming ID below the snapshot head means the snapshot is
            // no longer the fold of the full log in ID order; rebuild it
            // from scratch instead of folding on top.
            let rewinds = match (heads.remove(&entity_id), group.first()) {
                (Some(head), Some(first)) => first.id < head,
                _ => false,
            };

            let mut applications = Vec::with_capacity(group.len());
            let (snapshot, last) = if rewinds {
                let new_ids: HashSet<EventId> = group.iter().map(|e| e.id.clone()).collect();
                let mut merged = self.entity_log(&entity_id)?;
                merged.extend(group);
                merged.sort_by(|a, b| a.id.cmp(&b.id));

                let mut folded: Option<Entity> = None;
                let mut last = None;
                for event in merged {
                    let next = reduce(folded.as_ref(), &event)?;
                    last = Some((event.id.clone(), event.timestamp_millis));
                    if new_ids.contains(&event.id) {
                        applications.push(EventApplication {
                            event,
                            entity: next.clone(),
                        });
                    }
                    folded = Some(next);
                }
                (folded, last)
            } else {
                let mut folded = snapshots.remove(&entity_id);
                for event in group {
                    let next = reduce(folded.as_ref(), &event)?;
                    applications.push(EventApplication {
                        event,
                        entity: next.clone(),
                    });
                    folded = Some(next);
                }
                let last = applications
                    .last()
                    .map(|a| (a.event.id.clone(), a.event.timestamp_millis));
                (folded, last)
            };

            if let (Some(entity), Some((last_event_id, last_event_timestamp_millis))) =
                (snapshot, last)
            {
                let update = EntityUpdate {
                    entity,
                    events: applications.iter().map(|a| a.event.clone()).collect(),
                    last_event_id,
                    last_event_timestamp_millis,
                };
                self.backend.apply_entity_update(&update)?;
                tracing::debug!(
                    entity = %entity_id,
                    events = update.events.len(),
                    "applied entity update"
                );
            }
            applied.extend(applications);
        }

        Ok(applied)
    }

    /// Pages the full event log for one entity out of the backend. Order is
    /// the backend's insertion order; callers re-sort by ID before folding.
    fn entity_log(&self, entity_id: &EntityId) -> CoreResult<Vec<Event>> {
        const PAGE: usize = 1_024;
        let mut log = Vec::new();
        let mut after_id: Option<EventId> = None;
        loop {
            let page = self.backend.list_events(&EventQuery {
                limit: PAGE,
                after_id: after_id.clone(),
                entity_id: Some(entity_id.clone()),
            })?;
            let full = page.len() == PAGE;
            after_id = page.last().map(|e| e.id.clone());
            log.extend(page);
            if !full {
                break;
            }
        }
        Ok(log)
    }

    /// Lists entity snapshots in stable ascending insertion order.
    pub fn list_entities(&self, query: &EntityQuery) -> CoreResult<Vec<Entity>> {
        self.ensure_open()?;
        self.backend.list_entities(query)
    }

    /// Lists tasks with at least one live component due at or before
    /// `threshold_millis`.
    pub fn query_due_tasks(
        &self,
        threshold_millis: i64,
        limit: usize,
        after_id: Option<EntityId>,
    ) -> CoreResult<Vec<Task>> {
        let entities = self.list_entities(&EntityQuery {
            entity_type: EntityType::Task,
            limit,
            after_id,
            predicate: Some(DuePredicate {
                op: CmpOp::Le,
                due_timestamp_millis: threshold_millis,
            }),
        })?;
        Ok(entities
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Task(task) => Some(task),
                Entity::AttachmentReference(_) => None,
            })
            .collect())
    }

    /// Lists events in ascending insertion (event-ID) order.
    pub fn list_events(&self, query: &EventQuery) -> CoreResult<Vec<Event>> {
        self.ensure_open()?;
        self.backend.list_events(query)
    }

    /// Bulk point lookup. Missing IDs are absent from the map, not errors.
    pub fn get_entities(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, Entity>> {
        self.ensure_open()?;
        Ok(self
            .backend
            .get_entities(ids)?
            .into_iter()
            .map(|entity| (entity.id().clone(), entity))
            .collect())
    }

    /// Reads a bookkeeping value (sync checkpoints live here).
    pub fn get_metadata(&self, key: &str) -> CoreResult<Option<String>> {
        self.ensure_open()?;
        self.backend.get_metadata(key)
    }

    /// Writes a bookkeeping value.
    pub fn set_metadata(&self, key: &str, value: &str) -> CoreResult<()> {
        self.ensure_open()?;
        self.backend.set_metadata(key, value)
    }

    /// Stores an attachment payload (no-op when already present).
    pub fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.attachments.put_attachment(id, mime_type, contents)
    }

    /// Reads an attachment payload.
    pub fn get_attachment(
        &self,
        id: &EntityId,
    ) -> CoreResult<Option<(AttachmentMimeType, Vec<u8>)>> {
        self.ensure_open()?;
        self.attachments.get_attachment(id)
    }

    /// Returns whether an attachment payload exists.
    pub fn has_attachment(&self, id: &EntityId) -> CoreResult<bool> {
        self.ensure_open()?;
        self.attachments.has_attachment(id)
    }

    /// Rows in the derived due-component index for one task.
    pub fn derived_components(&self, task_id: &EntityId) -> CoreResult<Vec<(String, i64)>> {
        self.ensure_open()?;
        self.backend.derived_components(task_id)
    }

    /// Closes the database and releases backend resources.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        self.backend.close()?;
        *is_open = false;
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
