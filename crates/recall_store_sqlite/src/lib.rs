//! # Recall SQLite backend
//!
//! Relational storage backend for the Recall store.
//!
//! This crate provides:
//! - The five durable tables (`events`, `entities`, `derived_task_components`,
//!   `attachments`, `metadata`)
//! - Ordered, versioned schema migrations tracked in `metadata`
//! - Explicit derived-index maintenance inside the entity write transaction
//!
//! Events are the source of truth: migrations never destructively alter
//! event rows, and the entity/derived tables can always be rebuilt by
//! replaying the log.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod migrations;
mod schema;

pub use backend::{SqliteBackend, StoreStats};
pub use migrations::{current_schema_version, migrate, LATEST_SCHEMA_VERSION};
