//! # Recall Testkit
//!
//! Test utilities for the Recall store.
//!
//! This crate provides:
//! - Database fixtures over the in-memory backend
//! - An [`EventFactory`] for building well-formed event sequences with a
//!   deterministic clock and ID generator
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recall_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_memory_db(|db, factory| {
//!         let task_id = factory.entity_id();
//!         db.put_events(&[factory.ingest_qa(&task_id, "Q", "A")]).unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
