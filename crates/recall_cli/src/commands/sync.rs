//! Sync command implementation.

use recall_core::Database;
use recall_store_sqlite::SqliteBackend;
use recall_sync::{HttpEndpoint, RetryConfig, SyncConfig, SyncEngine};
use std::path::Path;
use std::sync::Arc;

/// Environment variable holding the remote access credential.
pub const CREDENTIAL_ENV: &str = "RECALL_API_KEY";

/// Runs one full bidirectional sync pass.
pub fn run(
    store: &Path,
    server: &str,
    peer: &str,
    receive_batch_size: usize,
    send_batch_size: usize,
    retries: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let credential = std::env::var(CREDENTIAL_ENV)
        .map_err(|_| format!("{CREDENTIAL_ENV} must be set to the remote access credential"))?;

    tracing::info!(store = %store.display(), server, peer, "starting sync pass");

    let backend = Arc::new(SqliteBackend::open(store)?);
    let db = Arc::new(Database::new(backend));
    let endpoint = HttpEndpoint::new(server, &credential);

    let config = SyncConfig::new(peer)
        .with_receive_batch_size(receive_batch_size)
        .with_send_batch_size(send_batch_size)
        .with_retry(RetryConfig::new(retries.max(1)));

    let engine = SyncEngine::new(db, endpoint, config);
    let summary = engine.sync_with_retry()?;

    println!(
        "synced with {server}: pulled {} events, pushed {} events, {} attachments ({:?})",
        summary.pulled, summary.pushed, summary.attachments, summary.duration
    );
    Ok(())
}
