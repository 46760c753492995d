//! Destination schema of the mirror store.

use std::sync::LazyLock;

use regex::Regex;

use super::error::{MirrorError, MirrorResult};

pub const DEFAULT_TABLE_PREFIX: &str = "catalog_";

static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Names of the five mirror relations, all sharing one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSchema {
    prefix: String,
}

impl Default for MirrorSchema {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl MirrorSchema {
    /// Use `prefix` for every relation. An empty prefix is allowed.
    pub fn new(prefix: &str) -> MirrorResult<Self> {
        let valid = IDENTIFIER
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(prefix));
        if !prefix.is_empty() && !valid {
            return Err(MirrorError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn tables(&self) -> String {
        format!("{}tables", self.prefix)
    }

    pub fn columns(&self) -> String {
        format!("{}columns", self.prefix)
    }

    pub fn primary_keys(&self) -> String {
        format!("{}primary_keys", self.prefix)
    }

    pub fn foreign_keys(&self) -> String {
        format!("{}foreign_keys", self.prefix)
    }

    pub fn indices(&self) -> String {
        format!("{}indices", self.prefix)
    }

    /// The four relations hanging off the parent table.
    pub fn child_tables(&self) -> [String; 4] {
        [
            self.columns(),
            self.primary_keys(),
            self.foreign_keys(),
            self.indices(),
        ]
    }

    /// Idempotent DDL for the whole schema.
    pub fn ddl(&self) -> String {
        let p = &self.prefix;
        format!(
            "
            CREATE TABLE IF NOT EXISTS {p}tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                table_name TEXT NOT NULL,
                tablespace TEXT,
                status TEXT,
                row_count INTEGER,
                last_analyzed TEXT,
                comment TEXT,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (owner, table_name)
            );

            CREATE TABLE IF NOT EXISTS {p}columns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES {p}tables(id) ON DELETE CASCADE,
                column_name TEXT NOT NULL,
                data_type TEXT NOT NULL,
                data_length INTEGER,
                data_precision INTEGER,
                data_scale INTEGER,
                nullable INTEGER NOT NULL,
                default_value TEXT,
                comment TEXT,
                ordinal_position INTEGER NOT NULL,
                UNIQUE (table_id, column_name)
            );

            CREATE TABLE IF NOT EXISTS {p}primary_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES {p}tables(id) ON DELETE CASCADE,
                column_name TEXT NOT NULL,
                position INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS {p}foreign_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES {p}tables(id) ON DELETE CASCADE,
                constraint_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                referenced_table TEXT NOT NULL,
                referenced_column TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS {p}indices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES {p}tables(id) ON DELETE CASCADE,
                index_name TEXT NOT NULL,
                index_type TEXT NOT NULL,
                uniqueness TEXT NOT NULL,
                column_name TEXT NOT NULL,
                status TEXT NOT NULL,
                position INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS {p}columns_table_idx ON {p}columns(table_id);
            CREATE INDEX IF NOT EXISTS {p}primary_keys_table_idx ON {p}primary_keys(table_id);
            CREATE INDEX IF NOT EXISTS {p}foreign_keys_table_idx ON {p}foreign_keys(table_id);
            CREATE INDEX IF NOT EXISTS {p}indices_table_idx ON {p}indices(table_id);
            "
        )
    }
}
