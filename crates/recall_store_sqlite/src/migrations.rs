//! Ordered, versioned schema migrations.
//!
//! Each migration runs exactly once, inside its own transaction, and the
//! applied version is recorded in the `metadata` table. A failed migration
//! leaves the version untouched and must prevent the store from opening.

use crate::schema;
use recall_core::{CoreError, CoreResult};
use rusqlite::{Connection, OptionalExtension};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, schema::MIGRATION_V1_SQL),
    (2, schema::MIGRATION_V2_SQL),
];

/// Reads the applied schema version from `metadata` (0 for a fresh file).
pub fn current_schema_version(conn: &Connection) -> CoreResult<u32> {
    let has_metadata: bool = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'metadata'
            )",
            [],
            |row| row.get(0),
        )
        .map_err(storage_err)?;
    if !has_metadata {
        return Ok(0);
    }

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [schema::SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)?;

    match version {
        None => Ok(0),
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| CoreError::migration_failed(format!("corrupt schema version {v:?}"))),
    }
}

/// Applies all pending migrations in ascending order.
///
/// # Errors
///
/// Returns [`CoreError::MigrationFailed`] if any migration fails; callers
/// must treat that as fatal for the open.
pub fn migrate(conn: &mut Connection) -> CoreResult<u32> {
    let mut current = current_schema_version(conn)?;
    if current > LATEST_SCHEMA_VERSION {
        return Err(CoreError::migration_failed(format!(
            "store schema v{current} is newer than supported v{LATEST_SCHEMA_VERSION}"
        )));
    }

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction().map_err(migration_err)?;
        tx.execute_batch(sql).map_err(migration_err)?;
        tx.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (schema::SCHEMA_VERSION_KEY, version.to_string()),
        )
        .map_err(migration_err)?;
        tx.commit().map_err(migration_err)?;

        tracing::info!(version, "applied schema migration");
        current = *version;
    }

    Ok(current)
}

fn storage_err(e: rusqlite::Error) -> CoreError {
    CoreError::storage(e.to_string())
}

fn migration_err(e: rusqlite::Error) -> CoreError {
    CoreError::migration_failed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2
            )",
            (object_type, object_name),
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() {
        let mut conn = Connection::open_in_memory().unwrap();

        let applied = migrate(&mut conn).unwrap();
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(
            current_schema_version(&conn).unwrap(),
            LATEST_SCHEMA_VERSION
        );

        for table in [
            "events",
            "entities",
            "derived_task_components",
            "attachments",
            "metadata",
        ] {
            assert!(
                sqlite_object_exists(&conn, "table", table).unwrap(),
                "missing table {table}"
            );
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index).unwrap(),
                "missing index {index}"
            );
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn).unwrap(), LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn migrate_upgrades_from_v1() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::MIGRATION_V1_SQL).unwrap();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, '1')",
            [schema::SCHEMA_VERSION_KEY],
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), LATEST_SCHEMA_VERSION);
        for index in schema::REQUIRED_INDEXES {
            assert!(sqlite_object_exists(&conn, "index", index).unwrap());
        }
    }

    #[test]
    fn newer_schema_refuses_to_open() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = '99' WHERE key = ?1",
            [schema::SCHEMA_VERSION_KEY],
        )
        .unwrap();

        let result = migrate(&mut conn);
        assert!(matches!(result, Err(CoreError::MigrationFailed { .. })));
    }
}
