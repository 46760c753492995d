//! Read-only queries over the mirror store.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use super::error::MirrorResult;
use super::schema::MirrorSchema;

/// Most rows returned by [`MirrorReader::search`].
pub const SEARCH_LIMIT: usize = 100;

/// Parent row of a mirrored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub owner: String,
    pub table_name: String,
    pub comment: Option<String>,
    pub row_count: Option<i64>,
    pub last_analyzed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRow {
    pub column_name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
    pub ordinal_position: u32,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRow {
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRow {
    pub index_name: String,
    pub index_type: String,
    pub uniqueness: String,
    pub column_name: String,
    pub status: String,
}

/// Everything mirrored for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDetail {
    pub table: TableSummary,
    pub columns: Vec<ColumnRow>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub indices: Vec<IndexRow>,
}

/// `%fragment%` for LIKE, with `\` escaping wildcards in the fragment.
fn like_pattern(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 2);
    out.push('%');
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Read-only view of a mirror database.
pub struct MirrorReader {
    schema: MirrorSchema,
    conn: Mutex<Connection>,
}

impl MirrorReader {
    /// Open an existing mirror read-only.
    pub fn open<P: AsRef<Path>>(path: P, schema: MirrorSchema) -> MirrorResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            schema,
            conn: Mutex::new(conn),
        })
    }

    /// Cheap round trip to the store.
    pub fn ping(&self) -> MirrorResult<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// First table (by owner, name) whose name contains `name_pattern`,
    /// optionally restricted to one owner, with all its children.
    pub fn table_detail(
        &self,
        name_pattern: &str,
        owner: Option<&str>,
    ) -> MirrorResult<Option<TableDetail>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let s = &self.schema;

        let found = conn
            .query_row(
                &format!(
                    "SELECT id, owner, table_name, comment, row_count, last_analyzed
                     FROM {}
                     WHERE table_name LIKE ?1 ESCAPE '\\'
                       AND (?2 IS NULL OR owner = ?2)
                     ORDER BY owner, table_name
                     LIMIT 1",
                    s.tables()
                ),
                params![like_pattern(name_pattern.trim()), non_blank(owner)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        TableSummary {
                            owner: row.get(1)?,
                            table_name: row.get(2)?,
                            comment: row.get(3)?,
                            row_count: row.get(4)?,
                            last_analyzed: row.get(5)?,
                        },
                    ))
                },
            )
            .optional()?;

        let Some((table_id, table)) = found else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT c.column_name, c.data_type, c.nullable, c.default_value, c.comment,
                    c.ordinal_position,
                    EXISTS (SELECT 1 FROM {pk} p
                            WHERE p.table_id = c.table_id AND p.column_name = c.column_name)
             FROM {columns} c
             WHERE c.table_id = ?1
             ORDER BY c.ordinal_position",
            pk = s.primary_keys(),
            columns = s.columns()
        ))?;
        let columns = stmt
            .query_map([table_id], |row| {
                Ok(ColumnRow {
                    column_name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get(2)?,
                    default_value: row.get(3)?,
                    comment: row.get(4)?,
                    ordinal_position: row.get(5)?,
                    is_primary_key: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT column_name FROM {} WHERE table_id = ?1 ORDER BY position",
            s.primary_keys()
        ))?;
        let primary_keys = stmt
            .query_map([table_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT constraint_name, column_name, referenced_table, referenced_column
             FROM {} WHERE table_id = ?1 ORDER BY constraint_name, id",
            s.foreign_keys()
        ))?;
        let foreign_keys = stmt
            .query_map([table_id], |row| {
                Ok(ForeignKeyRow {
                    constraint_name: row.get(0)?,
                    column_name: row.get(1)?,
                    referenced_table: row.get(2)?,
                    referenced_column: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT index_name, index_type, uniqueness, column_name, status
             FROM {} WHERE table_id = ?1 ORDER BY position",
            s.indices()
        ))?;
        let indices = stmt
            .query_map([table_id], |row| {
                Ok(IndexRow {
                    index_name: row.get(0)?,
                    index_type: row.get(1)?,
                    uniqueness: row.get(2)?,
                    column_name: row.get(3)?,
                    status: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(TableDetail {
            table,
            columns,
            primary_keys,
            foreign_keys,
            indices,
        }))
    }

    /// Tables whose name or comment contains `keyword`, optionally for one
    /// owner. A blank keyword matches everything. At most [`SEARCH_LIMIT`].
    pub fn search(
        &self,
        keyword: Option<&str>,
        owner: Option<&str>,
    ) -> MirrorResult<Vec<TableSummary>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let pattern = non_blank(keyword).map(like_pattern);

        let mut stmt = conn.prepare(&format!(
            "SELECT owner, table_name, comment, row_count, last_analyzed
             FROM {}
             WHERE (?1 IS NULL
                    OR table_name LIKE ?1 ESCAPE '\\'
                    OR comment LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR owner = ?2)
             ORDER BY owner, table_name
             LIMIT {}",
            self.schema.tables(),
            SEARCH_LIMIT
        ))?;
        let tables = stmt
            .query_map(params![pattern, non_blank(owner)], |row| {
                Ok(TableSummary {
                    owner: row.get(0)?,
                    table_name: row.get(1)?,
                    comment: row.get(2)?,
                    row_count: row.get(3)?,
                    last_analyzed: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("EMP"), "%EMP%");
        assert_eq!(like_pattern("A_B%"), "%A\\_B\\%%");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  HR ")), Some("HR"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
