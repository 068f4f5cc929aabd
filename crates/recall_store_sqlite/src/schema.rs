//! SQLite schema for the Recall store.
//!
//! - `events` is the append-only log; `sequence_number` is the insertion
//!   order that queries and sync cursors page over
//! - `entities` holds the latest snapshot per entity, keyed by `row_id` for
//!   stable list ordering
//! - `derived_task_components` mirrors the live (non-deleted) component keys
//!   of every task, maintained by explicit code inside the entity write
//!   transaction rather than triggers
//! - `attachments` stores immutable binary payloads keyed by attachment ID
//! - `metadata` tracks the schema version and sync checkpoints

/// Migration v1: the five core tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    sequence_number INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE CHECK (length(id) = 22),
    entity_id TEXT NOT NULL CHECK (length(entity_id) = 22),
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE CHECK (length(id) = 22),
    entity_type TEXT NOT NULL CHECK (entity_type IN ('task', 'attachmentReference')),
    last_event_id TEXT NOT NULL,
    last_event_timestamp_millis INTEGER NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS derived_task_components (
    task_id TEXT NOT NULL,
    component_id TEXT NOT NULL,
    due_timestamp_millis INTEGER NOT NULL,
    PRIMARY KEY (task_id, component_id)
);

CREATE TABLE IF NOT EXISTS attachments (
    id TEXT PRIMARY KEY CHECK (length(id) = 22),
    mime_type TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Migration v2: read-path indexes for event paging and due queries.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_entity_sequence
    ON events(entity_id, sequence_number);

CREATE INDEX IF NOT EXISTS idx_entities_type_row
    ON entities(entity_type, row_id);

CREATE INDEX IF NOT EXISTS idx_derived_due
    ON derived_task_components(due_timestamp_millis, task_id);
"#;

/// Indexes expected by the list/due query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_events_entity_sequence",
    "idx_entities_type_row",
    "idx_derived_due",
];

/// Metadata key holding the applied schema version.
pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";
