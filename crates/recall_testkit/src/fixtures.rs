//! Test fixtures and database helpers.
//!
//! Provides a deterministic event factory and convenience functions for
//! setting up test databases over the in-memory backend.

use recall_core::{
    AttachmentMimeType, ComponentSchedule, Database, Entity, EntityId, Event, EventPayload,
    OrderedIdGenerator, RepetitionOutcome, Task, TaskProvenance, TaskSpec,
};
use recall_store_memory::MemoryBackend;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds well-formed event sequences with a deterministic clock and ID
/// generator, so tests replay identically run to run.
pub struct EventFactory {
    generator: OrderedIdGenerator,
    clock_millis: i64,
}

impl EventFactory {
    /// Creates a factory seeded at `seed`, with the clock at `start_millis`.
    #[must_use]
    pub fn new(seed: u64, start_millis: i64) -> Self {
        Self {
            generator: OrderedIdGenerator::from_seed(seed),
            clock_millis: start_millis,
        }
    }

    /// Current factory clock in milliseconds.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock_millis
    }

    /// Moves the factory clock forward.
    pub fn advance(&mut self, millis: i64) {
        self.clock_millis += millis;
    }

    /// A fresh random entity ID.
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        EntityId::random()
    }

    /// Wraps a payload in an event stamped with the factory clock and the
    /// next ordered ID.
    pub fn event(&mut self, entity_id: &EntityId, payload: EventPayload) -> Event {
        Event {
            id: self.generator.generate_at(self.clock_millis as u64),
            entity_id: entity_id.clone(),
            timestamp_millis: self.clock_millis,
            payload,
        }
    }

    /// A question/answer task ingest event.
    pub fn ingest_qa(&mut self, entity_id: &EntityId, body: &str, answer: &str) -> Event {
        self.event(
            entity_id,
            EventPayload::TaskIngest {
                spec: TaskSpec::Qa {
                    body: body.to_string(),
                    answer: answer.to_string(),
                },
                provenance: None,
                metadata: BTreeMap::new(),
            },
        )
    }

    /// A task ingest event with explicit spec, provenance, and metadata.
    pub fn ingest(
        &mut self,
        entity_id: &EntityId,
        spec: TaskSpec,
        provenance: Option<TaskProvenance>,
        metadata: BTreeMap<String, String>,
    ) -> Event {
        self.event(
            entity_id,
            EventPayload::TaskIngest {
                spec,
                provenance,
                metadata,
            },
        )
    }

    /// A repetition event carrying the given schedule output.
    pub fn repetition(
        &mut self,
        entity_id: &EntityId,
        component_id: &str,
        outcome: RepetitionOutcome,
        due_timestamp_millis: i64,
        interval_millis: i64,
    ) -> Event {
        self.event(
            entity_id,
            EventPayload::TaskRepetition {
                component_id: component_id.to_string(),
                outcome,
                schedule: ComponentSchedule {
                    due_timestamp_millis,
                    interval_millis,
                },
            },
        )
    }

    /// An administrative reschedule event.
    pub fn reschedule(
        &mut self,
        entity_id: &EntityId,
        component_id: &str,
        new_due_timestamp_millis: i64,
        new_interval_millis: Option<i64>,
    ) -> Event {
        self.event(
            entity_id,
            EventPayload::TaskReschedule {
                component_id: component_id.to_string(),
                new_due_timestamp_millis,
                new_interval_millis,
            },
        )
    }

    /// A soft-deletion toggle event.
    pub fn set_deleted(&mut self, entity_id: &EntityId, is_deleted: bool) -> Event {
        self.event(entity_id, EventPayload::TaskUpdateDeleted { is_deleted })
    }

    /// An attachment reference ingest event.
    pub fn attachment_ingest(
        &mut self,
        entity_id: &EntityId,
        mime_type: AttachmentMimeType,
    ) -> Event {
        self.event(entity_id, EventPayload::AttachmentIngest { mime_type })
    }
}

/// A test database over the in-memory backend, with a matching factory.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// Event factory sharing the database's notion of time.
    pub factory: EventFactory,
}

impl TestDatabase {
    /// Creates an in-memory database with a deterministic factory.
    #[must_use]
    pub fn memory() -> Self {
        Self::memory_seeded(0)
    }

    /// Creates an in-memory database with a caller-chosen seed.
    #[must_use]
    pub fn memory_seeded(seed: u64) -> Self {
        Self {
            db: Database::new(Arc::new(MemoryBackend::new())),
            factory: EventFactory::new(seed, 1_700_000_000_000),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a fresh in-memory database and event factory.
pub fn with_memory_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &mut EventFactory) -> R,
{
    let mut fixture = TestDatabase::memory();
    f(&fixture.db, &mut fixture.factory)
}

/// Unwraps a task snapshot out of an [`Entity`], panicking otherwise.
#[must_use]
pub fn expect_task(entity: &Entity) -> &Task {
    match entity {
        Entity::Task(task) => task,
        Entity::AttachmentReference(_) => panic!("expected a task, got {entity:?}"),
    }
}
