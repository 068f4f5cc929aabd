//! Inspect command implementation.

use recall_store_sqlite::SqliteBackend;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Applied schema version.
    pub schema_version: u32,
    /// Rows in the event log.
    pub event_count: u64,
    /// Task snapshots.
    pub task_count: u64,
    /// Attachment reference snapshots.
    pub attachment_reference_count: u64,
    /// Stored attachment payloads.
    pub attachment_count: u64,
    /// Rows in the derived due-component index.
    pub derived_component_count: u64,
}

/// Runs the inspect command.
pub fn run(store: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !store.exists() {
        return Err(format!("No store found at {store:?}").into());
    }

    let backend = SqliteBackend::open(store)?;
    let stats = backend.stats()?;
    let result = InspectResult {
        path: store.display().to_string(),
        schema_version: stats.schema_version,
        event_count: stats.event_count,
        task_count: stats.task_count,
        attachment_reference_count: stats.attachment_reference_count,
        attachment_count: stats.attachment_count,
        derived_component_count: stats.derived_component_count,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => {
            println!("Store: {}", result.path);
            println!("  Schema version:        {}", result.schema_version);
            println!("  Events:                {}", result.event_count);
            println!("  Tasks:                 {}", result.task_count);
            println!("  Attachment references: {}", result.attachment_reference_count);
            println!("  Attachment payloads:   {}", result.attachment_count);
            println!("  Derived index rows:    {}", result.derived_component_count);
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}
