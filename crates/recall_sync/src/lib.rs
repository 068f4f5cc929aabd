//! # Recall Sync
//!
//! Bidirectional sync engine for the Recall store.
//!
//! This crate provides:
//! - The narrow [`SyncEndpoint`] adapter interface (list/put events, move
//!   attachment payloads)
//! - [`DatabaseEndpoint`] for in-process store-to-store sync
//! - [`HttpEndpoint`] over the remote events/attachments API
//! - [`SyncEngine`], a pull-then-push pass with persisted per-direction
//!   checkpoints and retry with exponential backoff
//!
//! ## Key invariants
//!
//! - Pull always happens before push
//! - Event ingestion is idempotent, so redelivery after a partial pass is
//!   safe
//! - Checkpoints persist in the local store's metadata; a pass is resumable
//!   after any transient failure
//! - Convergence needs no conflict resolution: events are immutable facts
//!   and snapshots fold in event-ID order on both sides

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod engine;
mod error;
mod http;

pub use config::{RetryConfig, SyncConfig};
pub use endpoint::{DatabaseEndpoint, EventBatch, SyncEndpoint};
pub use engine::{SyncEngine, SyncState, SyncStats, SyncSummary};
pub use error::{SyncError, SyncResult};
pub use http::HttpEndpoint;
