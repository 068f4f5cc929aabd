//! The SQLite storage backend.

use crate::migrations;
use parking_lot::Mutex;
use recall_core::{
    AttachmentMimeType, AttachmentStore, CoreError, CoreResult, Entity, EntityId, EntityQuery,
    EntityUpdate, EventId, EventQuery, StorageBackend,
};
use recall_core::Event;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Chunk size for `IN (...)` lookups.
const IN_CHUNK: usize = 256;

/// A [`StorageBackend`] and [`AttachmentStore`] over a single SQLite file.
///
/// All five tables live in one database file (plus SQLite's WAL/journal
/// files). Writes serialize through an internal mutex, matching the
/// single-writer-per-store discipline; every entity update runs in one
/// transaction so readers never observe a torn update.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a store at `path` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MigrationFailed`] if the schema cannot be
    /// brought to the supported version; the store must not be used in a
    /// partial-schema state.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::init(conn)
    }

    /// Opens a fresh in-memory store, for tests and ephemeral use.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> CoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;

        migrations::migrate(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn event_sequence(conn: &Connection, id: &EventId) -> CoreResult<Option<i64>> {
        conn.query_row(
            "SELECT sequence_number FROM events WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    fn entity_row(conn: &Connection, id: &EntityId) -> CoreResult<Option<i64>> {
        conn.query_row(
            "SELECT row_id FROM entities WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }
}

/// Row counts and schema version for one store file.
#[derive(Debug, Clone)]
pub struct StoreStats {
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

impl SqliteBackend {
    /// Collects row counts and the schema version, for inspection tooling.
    pub fn stats(&self) -> CoreResult<StoreStats> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> CoreResult<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(storage_err)
        };
        Ok(StoreStats {
            schema_version: crate::migrations::current_schema_version(&conn)?,
            event_count: count("SELECT COUNT(*) FROM events")?,
            task_count: count("SELECT COUNT(*) FROM entities WHERE entity_type = 'task'")?,
            attachment_reference_count: count(
                "SELECT COUNT(*) FROM entities WHERE entity_type = 'attachmentReference'",
            )?,
            attachment_count: count("SELECT COUNT(*) FROM attachments")?,
            derived_component_count: count("SELECT COUNT(*) FROM derived_task_components")?,
        })
    }
}

impl StorageBackend for SqliteBackend {
    fn existing_event_ids(&self, ids: &[EventId]) -> CoreResult<HashSet<EventId>> {
        let conn = self.conn.lock();
        let mut found = HashSet::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT id FROM events WHERE id IN ({placeholders})");
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(|id| id.as_str())),
                    |row| row.get::<_, String>(0),
                )
                .map_err(storage_err)?;
            for row in rows {
                let id = row.map_err(storage_err)?;
                found.insert(EventId::parse(id)?);
            }
        }
        Ok(found)
    }

    fn get_entities(&self, ids: &[EntityId]) -> CoreResult<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut entities = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT data FROM entities WHERE id IN ({placeholders}) ORDER BY row_id ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(|id| id.as_str())),
                    |row| row.get::<_, String>(0),
                )
                .map_err(storage_err)?;
            for row in rows {
                let data = row.map_err(storage_err)?;
                entities.push(serde_json::from_str(&data)?);
            }
        }
        Ok(entities)
    }

    fn entity_heads(&self, ids: &[EntityId]) -> CoreResult<BTreeMap<EntityId, EventId>> {
        let conn = self.conn.lock();
        let mut heads = BTreeMap::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT id, last_event_id FROM entities WHERE id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
            let rows = stmt
                .query_map(
                    params_from_iter(chunk.iter().map(|id| id.as_str())),
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .map_err(storage_err)?;
            for row in rows {
                let (id, head) = row.map_err(storage_err)?;
                heads.insert(EntityId::parse(id)?, EventId::parse(head)?);
            }
        }
        Ok(heads)
    }

    fn list_entities(&self, query: &EntityQuery) -> CoreResult<Vec<Entity>> {
        let conn = self.conn.lock();

        let after_row = match &query.after_id {
            None => None,
            Some(id) => Some(Self::entity_row(&conn, id)?.ok_or_else(|| {
                CoreError::invalid_operation(format!("unknown entity cursor {id}"))
            })?),
        };

        let mut sql = String::from(
            "SELECT e.data FROM entities e WHERE e.entity_type = ?1",
        );
        let mut params: Vec<rusqlite::types::Value> =
            vec![query.entity_type.as_str().to_string().into()];

        if let Some(row) = after_row {
            params.push(row.into());
            sql.push_str(&format!(" AND e.row_id > ?{}", params.len()));
        }
        if let Some(predicate) = &query.predicate {
            params.push(predicate.due_timestamp_millis.into());
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM derived_task_components d \
                 WHERE d.task_id = e.id AND d.due_timestamp_millis {} ?{})",
                predicate.op.sql(),
                params.len()
            ));
        }
        params.push((query.limit as i64).into());
        sql.push_str(&format!(" ORDER BY e.row_id ASC LIMIT ?{}", params.len()));

        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, String>(0))
            .map_err(storage_err)?;

        let mut entities = Vec::new();
        for row in rows {
            let data = row.map_err(storage_err)?;
            entities.push(serde_json::from_str(&data)?);
        }
        Ok(entities)
    }

    fn list_events(&self, query: &EventQuery) -> CoreResult<Vec<Event>> {
        let conn = self.conn.lock();

        let after_sequence = match &query.after_id {
            None => None,
            Some(id) => Some(Self::event_sequence(&conn, id)?.ok_or_else(|| {
                CoreError::invalid_operation(format!("unknown event cursor {id}"))
            })?),
        };

        let mut sql = String::from("SELECT data FROM events WHERE 1 = 1");
        let mut params: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(entity_id) = &query.entity_id {
            params.push(entity_id.as_str().to_string().into());
            sql.push_str(&format!(" AND entity_id = ?{}", params.len()));
        }
        if let Some(sequence) = after_sequence {
            params.push(sequence.into());
            sql.push_str(&format!(" AND sequence_number > ?{}", params.len()));
        }
        params.push((query.limit as i64).into());
        sql.push_str(&format!(
            " ORDER BY sequence_number ASC LIMIT ?{}",
            params.len()
        ));

        let mut stmt = conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, String>(0))
            .map_err(storage_err)?;

        let mut events = Vec::new();
        for row in rows {
            let data = row.map_err(storage_err)?;
            events.push(serde_json::from_str(&data)?);
        }
        Ok(events)
    }

    fn apply_entity_update(&self, update: &EntityUpdate) -> CoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage_err)?;

        for event in &update.events {
            let data = serde_json::to_string(event)?;
            tx.execute(
                "INSERT INTO events (id, entity_id, data) VALUES (?1, ?2, ?3)",
                (event.id.as_str(), event.entity_id.as_str(), data),
            )
            .map_err(storage_err)?;
        }

        let entity_id = update.entity.id().clone();
        let data = serde_json::to_string(&update.entity)?;
        tx.execute(
            "INSERT INTO entities
                 (id, entity_type, last_event_id, last_event_timestamp_millis, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 entity_type = excluded.entity_type,
                 last_event_id = excluded.last_event_id,
                 last_event_timestamp_millis = excluded.last_event_timestamp_millis,
                 data = excluded.data",
            (
                entity_id.as_str(),
                update.entity.entity_type().as_str(),
                update.last_event_id.as_str(),
                update.last_event_timestamp_millis,
                data,
            ),
        )
        .map_err(storage_err)?;

        // Derived-index maintenance: clear then rebuild this task's rows so
        // the index always mirrors the snapshot's live component keys.
        tx.execute(
            "DELETE FROM derived_task_components WHERE task_id = ?1",
            [entity_id.as_str()],
        )
        .map_err(storage_err)?;
        if let Entity::Task(task) = &update.entity {
            if !task.is_deleted {
                for (component_id, state) in &task.component_states {
                    tx.execute(
                        "INSERT INTO derived_task_components
                             (task_id, component_id, due_timestamp_millis)
                         VALUES (?1, ?2, ?3)",
                        (
                            entity_id.as_str(),
                            component_id,
                            state.due_timestamp_millis,
                        ),
                    )
                    .map_err(storage_err)?;
                }
            }
        }

        tx.commit().map_err(storage_err)
    }

    fn get_metadata(&self, key: &str) -> CoreResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err)
    }

    fn set_metadata(&self, key: &str, value: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn derived_components(&self, task_id: &EntityId) -> CoreResult<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT component_id, due_timestamp_millis
                 FROM derived_task_components
                 WHERE task_id = ?1
                 ORDER BY component_id ASC",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([task_id.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(storage_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
    }

    fn close(&self) -> CoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize").map_err(storage_err)
    }
}

impl AttachmentStore for SqliteBackend {
    fn put_attachment(
        &self,
        id: &EntityId,
        mime_type: AttachmentMimeType,
        contents: &[u8],
    ) -> CoreResult<()> {
        let conn = self.conn.lock();
        // First write wins; payloads are immutable once stored.
        conn.execute(
            "INSERT OR IGNORE INTO attachments (id, mime_type, data) VALUES (?1, ?2, ?3)",
            (id.as_str(), mime_type.as_str(), contents),
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn get_attachment(
        &self,
        id: &EntityId,
    ) -> CoreResult<Option<(AttachmentMimeType, Vec<u8>)>> {
        let conn = self.conn.lock();
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT mime_type, data FROM attachments WHERE id = ?1",
                [id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage_err)?;
        match row {
            None => Ok(None),
            Some((mime, data)) => {
                let mime_type = AttachmentMimeType::from_str_opt(&mime).ok_or_else(|| {
                    CoreError::storage(format!("unknown stored mime type {mime:?}"))
                })?;
                Ok(Some((mime_type, data)))
            }
        }
    }

    fn has_attachment(&self, id: &EntityId) -> CoreResult<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM attachments WHERE id = ?1)",
            [id.as_str()],
            |row| row.get(0),
        )
        .map_err(storage_err)
    }
}

fn storage_err(e: rusqlite::Error) -> CoreError {
    CoreError::storage(e.to_string())
}
