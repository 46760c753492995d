//! Transactional writer of the mirror store.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info, warn};

use super::error::{MirrorError, MirrorResult};
use super::hash::content_hash;
use super::schema::{MirrorSchema, DEFAULT_TABLE_PREFIX};
use crate::metadata::{is_missing_comment, TableMetadata};

/// Where the mirror lives and how its relations are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub path: PathBuf,
    pub table_prefix: String,
}

impl MirrorConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }
}

/// Catalog comments map to NULL when absent.
fn stored_comment(comment: &str) -> Option<&str> {
    if is_missing_comment(comment) {
        None
    } else {
        Some(comment)
    }
}

/// Writes one table at a time into the mirror.
///
/// All writes go through a single connection behind a mutex.
pub struct MirrorSink {
    schema: MirrorSchema,
    conn: Mutex<Option<Connection>>,
}

impl MirrorSink {
    /// Open the store and make sure the schema exists.
    pub fn open(config: &MirrorConfig) -> MirrorResult<Self> {
        let schema = MirrorSchema::new(&config.table_prefix)?;
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.path)?;
        let sink = Self::with_connection(conn, schema)?;
        info!(path = %config.path.display(), prefix = sink.schema.prefix(), "mirror opened");
        Ok(sink)
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory(schema: MirrorSchema) -> MirrorResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, schema)
    }

    fn with_connection(conn: Connection, schema: MirrorSchema) -> MirrorResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema.ddl())?;
        Ok(Self {
            schema,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn schema(&self) -> &MirrorSchema {
        &self.schema
    }

    /// Save a table, reporting success. Failures are logged and rolled back.
    pub fn save_table(&self, metadata: &TableMetadata) -> bool {
        match self.try_save_table(metadata) {
            Ok(table_id) => {
                debug!(table = %metadata.descriptor, table_id, "mirrored table");
                true
            }
            Err(e) => {
                warn!(table = %metadata.descriptor, error = %e, "mirror save failed; rolled back");
                false
            }
        }
    }

    /// Save a table in one transaction and return its parent row id.
    ///
    /// The parent row is upserted, then every child row of that parent is
    /// deleted and the current collections inserted, so readers never see
    /// old and new children mixed.
    pub fn try_save_table(&self, metadata: &TableMetadata) -> MirrorResult<i64> {
        let hash = content_hash(metadata)?;
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(MirrorError::Closed)?;

        let tx = conn.transaction()?;
        let table_id = self.upsert_parent(&tx, metadata, &hash)?;
        for child in self.schema.child_tables() {
            tx.execute(&format!("DELETE FROM {child} WHERE table_id = ?1"), [table_id])?;
        }
        self.insert_children(&tx, table_id, metadata)?;
        tx.commit()?;

        Ok(table_id)
    }

    fn upsert_parent(
        &self,
        tx: &Transaction<'_>,
        metadata: &TableMetadata,
        hash: &str,
    ) -> MirrorResult<i64> {
        let d = &metadata.descriptor;
        let tables = self.schema.tables();
        let now = Utc::now().to_rfc3339();
        let last_analyzed = d
            .last_analyzed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());

        tx.execute(
            &format!(
                "INSERT INTO {tables}
                    (owner, table_name, tablespace, status, row_count, last_analyzed,
                     comment, content_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT (owner, table_name) DO UPDATE SET
                    tablespace = excluded.tablespace,
                    status = excluded.status,
                    row_count = excluded.row_count,
                    last_analyzed = excluded.last_analyzed,
                    comment = excluded.comment,
                    content_hash = excluded.content_hash,
                    updated_at = excluded.updated_at"
            ),
            params![
                d.owner,
                d.table_name,
                d.tablespace,
                d.status,
                d.row_count,
                last_analyzed,
                stored_comment(&d.comment),
                hash,
                now,
            ],
        )?;

        let table_id = tx.query_row(
            &format!("SELECT id FROM {tables} WHERE owner = ?1 AND table_name = ?2"),
            params![d.owner, d.table_name],
            |row| row.get(0),
        )?;
        Ok(table_id)
    }

    fn insert_children(
        &self,
        tx: &Transaction<'_>,
        table_id: i64,
        metadata: &TableMetadata,
    ) -> MirrorResult<()> {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {}
                (table_id, column_name, data_type, data_length, data_precision, data_scale,
                 nullable, default_value, comment, ordinal_position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            self.schema.columns()
        ))?;
        for c in &metadata.columns {
            stmt.execute(params![
                table_id,
                c.name,
                c.data_type,
                c.length,
                c.precision,
                c.scale,
                c.nullable,
                c.default_value,
                stored_comment(&c.comment),
                c.ordinal_position,
            ])?;
        }

        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (table_id, column_name, position) VALUES (?1, ?2, ?3)",
            self.schema.primary_keys()
        ))?;
        for (position, column) in metadata.primary_key.columns.iter().enumerate() {
            stmt.execute(params![table_id, column, position as i64 + 1])?;
        }

        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {}
                (table_id, constraint_name, column_name, referenced_table, referenced_column)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.schema.foreign_keys()
        ))?;
        for fk in &metadata.foreign_keys {
            stmt.execute(params![
                table_id,
                fk.constraint_name,
                fk.local_column,
                fk.referenced_table,
                fk.referenced_column,
            ])?;
        }

        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {}
                (table_id, index_name, index_type, uniqueness, column_name, status, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            self.schema.indices()
        ))?;
        for (position, idx) in metadata.indices.iter().enumerate() {
            stmt.execute(params![
                table_id,
                idx.index_name,
                idx.index_type,
                idx.uniqueness,
                idx.column_name,
                idx.status,
                position as i64 + 1,
            ])?;
        }

        Ok(())
    }

    /// Number of parent rows currently stored.
    pub fn table_count(&self) -> MirrorResult<usize> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(MirrorError::Closed)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.schema.tables()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete a table and, through the cascade, all its children.
    pub fn delete_table(&self, owner: &str, table: &str) -> MirrorResult<bool> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(MirrorError::Closed)?;
        let rows = conn.execute(
            &format!(
                "DELETE FROM {} WHERE owner = ?1 AND table_name = ?2",
                self.schema.tables()
            ),
            params![owner, table],
        )?;
        Ok(rows > 0)
    }

    /// Close the connection. Later saves report failure.
    pub fn close(&self) {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "failed to close mirror cleanly");
            } else {
                debug!("mirror closed");
            }
        }
    }
}
