//! The narrow adapter interface the sync engine drives.
//!
//! Both sides of a sync round are reached through [`SyncEndpoint`]: the
//! remote is usually an [`crate::HttpEndpoint`], and any local store can be
//! wrapped in a [`DatabaseEndpoint`] (which also makes in-process
//! store-to-store sync possible, used heavily in tests).

use crate::error::SyncResult;
use recall_core::{
    AttachmentMimeType, Database, EntityId, Event, EventId, EventQuery,
};
use std::sync::Arc;

/// One page of events in ascending insertion order.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// The events, oldest first.
    pub events: Vec<Event>,
    /// Whether more events exist past this page.
    pub has_more: bool,
}

/// A store reachable by the sync engine.
///
/// The surface is deliberately narrow: list and put events, and move
/// attachment payloads. Everything else (dedup, folding, index maintenance)
/// happens inside the endpoint's own store.
pub trait SyncEndpoint: Send + Sync {
    /// Lists events appended after `after` (exclusive), oldest first.
    fn list_events(&self, after: Option<&EventId>, limit: usize) -> SyncResult<EventBatch>;

    /// Ingests a batch of events. Duplicates are no-ops on the receiving
    /// side, so redelivery is always safe.
    fn put_events(&self, events: Vec<Event>) -> SyncResult<()>;

    /// Stores an attachment payload (no-op when already present).
    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> SyncResult<()>;

    /// Reads an attachment payload, or `None` when absent.
    fn get_attachment(&self, id: &EntityId)
        -> SyncResult<Option<(AttachmentMimeType, Vec<u8>)>>;

    /// Returns whether a payload exists for the ID.
    fn has_attachment(&self, id: &EntityId) -> SyncResult<bool>;
}

/// [`SyncEndpoint`] over a local [`Database`].
pub struct DatabaseEndpoint {
    db: Arc<Database>,
}

impl DatabaseEndpoint {
    /// Wraps a database as a sync endpoint.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SyncEndpoint for DatabaseEndpoint {
    fn list_events(&self, after: Option<&EventId>, limit: usize) -> SyncResult<EventBatch> {
        let events = self.db.list_events(&EventQuery {
            limit,
            after_id: after.cloned(),
            entity_id: None,
        })?;
        let has_more = events.len() == limit;
        Ok(EventBatch { events, has_more })
    }

    fn put_events(&self, events: Vec<Event>) -> SyncResult<()> {
        self.db.put_events(events)?;
        Ok(())
    }

    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> SyncResult<()> {
        Ok(self.db.put_attachment(id, mime_type, contents)?)
    }

    fn get_attachment(
        &self,
        id: &EntityId,
    ) -> SyncResult<Option<(AttachmentMimeType, Vec<u8>)>> {
        Ok(self.db.get_attachment(id)?)
    }

    fn has_attachment(&self, id: &EntityId) -> SyncResult<bool> {
        Ok(self.db.has_attachment(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_store_memory::MemoryBackend;
    use recall_testkit::EventFactory;

    #[test]
    fn database_endpoint_pages_in_insertion_order() {
        let db = Arc::new(Database::new(Arc::new(MemoryBackend::new())));
        let mut factory = EventFactory::new(3, 1_000);

        let mut expected = Vec::new();
        for i in 0..5 {
            let task = factory.entity_id();
            let event = factory.ingest_qa(&task, &format!("q{i}"), "a");
            expected.push(event.id.clone());
            db.put_events(vec![event]).unwrap();
        }

        let endpoint = DatabaseEndpoint::new(db);
        let first = endpoint.list_events(None, 3).unwrap();
        assert!(first.has_more);
        assert_eq!(
            first.events.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            &expected[..3]
        );

        let rest = endpoint
            .list_events(Some(&expected[2]), 3)
            .unwrap();
        assert!(!rest.has_more);
        assert_eq!(
            rest.events.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            &expected[3..]
        );
    }
}
