//! SQLite catalog driver.
//!
//! Each attached database is an owner (`main` unless more are attached).
//! Introspection goes through the pragma table-valued functions, so every
//! query is parameterised by `(table, schema)` and never touches user data
//! except for the row count.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};

use super::{CatalogConnection, CatalogError, CatalogResult, ManageConnection, TableFilter};
use crate::metadata::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, TableDescriptor};

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

/// `NAME`, `NAME(n)` or `NAME(p,s)`.
static DECLARED_TYPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*([^(]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(-?\d+)\s*)?\))?\s*$").ok()
});

const NUMERIC_TYPES: &[&str] = &["DECIMAL", "NUMERIC", "NUMBER", "FLOAT", "DOUBLE", "REAL"];

/// A column type split into the parts the metadata model keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredType {
    pub name: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<i32>,
}

/// Split a declared SQLite column type.
///
/// For numeric families the first argument is the precision, otherwise it is
/// the length. Columns declared without a type are reported as `ANY`.
pub fn parse_declared_type(declared: &str) -> DeclaredType {
    let Some(caps) = DECLARED_TYPE
        .as_ref()
        .and_then(|pattern| pattern.captures(declared))
    else {
        return DeclaredType {
            name: declared.trim().to_string(),
            length: None,
            precision: None,
            scale: None,
        };
    };

    let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let name = if name.is_empty() { "ANY" } else { name }.to_string();
    let first = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
    let second = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());

    let upper = name.to_uppercase();
    if NUMERIC_TYPES.iter().any(|t| upper.contains(t)) {
        DeclaredType {
            name,
            length: None,
            precision: first,
            scale: second,
        }
    } else {
        DeclaredType {
            name,
            length: first,
            precision: None,
            scale: None,
        }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

/// Connection factory for a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManageConnection for SqliteCatalog {
    type Connection = SqliteConnection;

    fn connect(&self) -> CatalogResult<SqliteConnection> {
        // Read-only: a missing file is a connect error, never an empty catalog.
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|source| CatalogError::ConnectFailed {
            path: self.path.clone(),
            source,
        })?;

        Ok(SqliteConnection {
            conn,
            call_timeout: None,
        })
    }

    fn is_valid(&self, conn: &mut SqliteConnection) -> CatalogResult<()> {
        conn.ping()
    }

    fn apply_timeout(&self, conn: &mut SqliteConnection, timeout: Duration) {
        conn.set_call_timeout(timeout);
    }
}

/// One open SQLite catalog connection.
pub struct SqliteConnection {
    conn: Connection,
    call_timeout: Option<Duration>,
}

impl SqliteConnection {
    /// Run `f` under the call timeout. The progress handler interrupts the
    /// statement once the deadline passes.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> CatalogResult<T> {
        let Some(timeout) = self.call_timeout else {
            return f(&self.conn).map_err(CatalogError::from);
        };

        let deadline = Instant::now() + timeout;
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        let result = f(&self.conn);
        self.conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|e| {
            if is_interrupt(&e) {
                CatalogError::Timeout(timeout)
            } else {
                CatalogError::Query(e)
            }
        })
    }
}

impl CatalogConnection for SqliteConnection {
    fn list_tables(&mut self, filter: &TableFilter) -> CatalogResult<Vec<TableDescriptor>> {
        self.guarded(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, file FROM pragma_database_list ORDER BY name")?;
            let schemas: Vec<(String, String)> = stmt
                .query_map([], |row| {
                    let file: Option<String> = row.get(1)?;
                    Ok((row.get(0)?, file.unwrap_or_default()))
                })?
                .collect::<Result<_, _>>()?;

            let mut tables = Vec::new();
            for (schema, file) in schemas {
                if filter.owner.as_deref().is_some_and(|o| o != schema) {
                    continue;
                }

                let sql = format!(
                    "SELECT name FROM {}.sqlite_master \
                     WHERE type = 'table' AND substr(name, 1, 7) <> 'sqlite_' ORDER BY name",
                    quote_ident(&schema)
                );
                let names: Vec<String> = conn
                    .prepare(&sql)?
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;

                for name in names.into_iter().filter(|n| filter.matches(&schema, n)) {
                    let count_sql = format!(
                        "SELECT COUNT(*) FROM {}.{}",
                        quote_ident(&schema),
                        quote_ident(&name)
                    );
                    let rows: i64 = conn.query_row(&count_sql, [], |row| row.get(0))?;

                    let mut desc = TableDescriptor::new(schema.clone(), name).with_row_count(rows);
                    desc.tablespace = Some(file.clone()).filter(|f| !f.is_empty());
                    desc.status = Some("VALID".to_string());
                    tables.push(desc);
                }
            }
            Ok(tables)
        })
    }

    fn columns(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<ColumnDescriptor>> {
        self.guarded(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cid, name, type, \"notnull\", dflt_value \
                 FROM pragma_table_info(?1, ?2) ORDER BY cid",
            )?;
            let rows = stmt.query_map(params![table, owner], |row| {
                let cid: i64 = row.get(0)?;
                let name: String = row.get(1)?;
                let declared: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
                let not_null: bool = row.get(3)?;
                let default_value: Option<String> = row.get(4)?;

                let ty = parse_declared_type(&declared);
                Ok(ColumnDescriptor::from_catalog(
                    name,
                    &ty.name,
                    ty.length,
                    ty.precision,
                    ty.scale,
                    !not_null,
                    default_value,
                    None,
                    (cid + 1) as u32,
                ))
            })?;
            rows.collect()
        })
    }

    fn primary_keys(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<String>> {
        self.guarded(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
            )?;
            let rows = stmt.query_map(params![table, owner], |row| row.get(0))?;
            rows.collect()
        })
    }

    fn foreign_keys(
        &mut self,
        owner: &str,
        table: &str,
    ) -> CatalogResult<Vec<ForeignKeyDescriptor>> {
        let raw: Vec<(i64, usize, String, String, Option<String>)> = self.guarded(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, seq, \"table\", \"from\", \"to\" \
                 FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq",
            )?;
            let rows = stmt.query_map(params![table, owner], |row| {
                Ok((
                    row.get(0)?,
                    row.get::<_, i64>(1)? as usize,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?;
            rows.collect()
        })?;

        let mut keys = Vec::with_capacity(raw.len());
        for (id, seq, referenced_table, local_column, to) in raw {
            // `REFERENCES parent` without columns targets the parent's primary key.
            let referenced_column = match to {
                Some(column) => column,
                None => self
                    .primary_keys(owner, &referenced_table)?
                    .get(seq)
                    .cloned()
                    .unwrap_or_else(|| "rowid".to_string()),
            };
            keys.push((
                seq,
                ForeignKeyDescriptor {
                    constraint_name: format!("fk_{}_{}", table, id),
                    local_column,
                    referenced_table,
                    referenced_column,
                },
            ));
        }

        keys.sort_by(|(a_seq, a), (b_seq, b)| {
            a.constraint_name
                .cmp(&b.constraint_name)
                .then(a_seq.cmp(b_seq))
        });
        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }

    fn indices(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<IndexDescriptor>> {
        self.guarded(|conn| {
            let mut list = conn.prepare(
                "SELECT name, \"unique\", origin FROM pragma_index_list(?1, ?2) ORDER BY name",
            )?;
            let indexes: Vec<(String, bool, String)> = list
                .query_map(params![table, owner], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<_, _>>()?;

            let mut info = conn.prepare(
                "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
            )?;
            let mut rows = Vec::new();
            for (index_name, unique, origin) in indexes {
                let index_type = match origin.as_str() {
                    "pk" => "PRIMARY KEY",
                    "u" => "UNIQUE CONSTRAINT",
                    _ => "NORMAL",
                };
                let uniqueness = if unique { "UNIQUE" } else { "NONUNIQUE" };

                let columns: Vec<Option<String>> = info
                    .query_map(params![index_name, owner], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                for column in columns {
                    rows.push(IndexDescriptor {
                        index_name: index_name.clone(),
                        index_type: index_type.to_string(),
                        uniqueness: uniqueness.to_string(),
                        column_name: column.unwrap_or_else(|| "<expression>".to_string()),
                        status: "VALID".to_string(),
                    });
                }
            }
            Ok(rows)
        })
    }

    fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = Some(timeout);
        if let Err(e) = self.conn.busy_timeout(timeout) {
            tracing::debug!(error = %e, "failed to set busy timeout");
        }
    }

    fn ping(&mut self) -> CatalogResult<()> {
        self.guarded(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_type() {
        let ty = parse_declared_type("TEXT");
        assert_eq!(ty.name, "TEXT");
        assert_eq!(ty.length, None);
        assert_eq!(ty.precision, None);
    }

    #[test]
    fn test_parse_length_type() {
        let ty = parse_declared_type("VARCHAR(64)");
        assert_eq!(ty.name, "VARCHAR");
        assert_eq!(ty.length, Some(64));
        assert_eq!(ty.precision, None);
    }

    #[test]
    fn test_parse_numeric_type() {
        let ty = parse_declared_type("DECIMAL(10, 2)");
        assert_eq!(ty.name, "DECIMAL");
        assert_eq!(ty.length, None);
        assert_eq!(ty.precision, Some(10));
        assert_eq!(ty.scale, Some(2));
    }

    #[test]
    fn test_parse_multiword_type() {
        let ty = parse_declared_type("DOUBLE PRECISION");
        assert_eq!(ty.name, "DOUBLE PRECISION");
        assert_eq!(ty.precision, None);
    }

    #[test]
    fn test_declared_type_pattern_compiles() {
        assert!(DECLARED_TYPE.is_some());
    }

    #[test]
    fn test_parse_untyped_column() {
        assert_eq!(parse_declared_type("").name, "ANY");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("main"), "\"main\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
