//! # Recall Core
//!
//! Event-sourced core for the Recall spaced-repetition store.
//!
//! This crate provides:
//! - The entity and event model (tasks, attachment references)
//! - The pure reducer that folds events into entity snapshots
//! - Ordered/unique identifier generation
//! - Ingestion validation
//! - The [`Database`] facade over a pluggable [`StorageBackend`]
//!
//! Entities are never mutated directly: the live snapshot for an entity is
//! the deterministic left-fold of [`reduce`] over all events for that entity
//! ID, ordered by event ID, starting from `None`. Event IDs - not wall-clock
//! timestamps - are the sole ordering authority.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod database;
mod entity;
mod error;
mod event;
mod ids;
mod reducer;
mod validate;

pub use backend::{
    AttachmentStore, CmpOp, DuePredicate, EntityQuery, EntityUpdate, EventQuery, StorageBackend,
};
pub use database::{Database, EventApplication};
pub use entity::{
    AttachmentMimeType, AttachmentReference, ClozeRange, Entity, EntityType, Task,
    TaskComponentState, TaskProvenance, TaskSpec,
};
pub use error::{CoreError, CoreResult};
pub use event::{ComponentSchedule, Event, EventPayload, RepetitionOutcome};
pub use ids::{EntityId, EventId, OrderedIdGenerator, ID_LENGTH};
pub use reducer::reduce;
pub use validate::{validate_event, validate_events, ValidationIssue};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
