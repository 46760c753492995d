//! Metadata types shared by the catalog drivers, the extractor and the sinks.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Comment used when the catalog has no comment at all for an object.
///
/// An empty string in the catalog is kept as-is, so "no comment" and
/// "empty comment" stay distinguishable downstream.
pub const NO_DESCRIPTION: &str = "No description";

/// Normalize an optional catalog comment.
pub fn normalize_comment(comment: Option<String>) -> String {
    comment.unwrap_or_else(|| NO_DESCRIPTION.to_string())
}

fn no_description() -> String {
    NO_DESCRIPTION.to_string()
}

/// Whether a normalized comment is the "no description" sentinel.
pub fn is_missing_comment(comment: &str) -> bool {
    comment == NO_DESCRIPTION
}

/// Render a column type from its catalog parts.
///
/// - precision (and optional scale) wins: `NUMBER(10,2)`, `NUMBER(10)`
/// - otherwise a length: `VARCHAR2(64)`
/// - otherwise the bare type name: `DATE`
///
/// Zero values count as absent.
pub fn render_data_type(
    type_name: &str,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<i32>,
) -> String {
    let length = length.filter(|l| *l > 0);
    let precision = precision.filter(|p| *p > 0);

    match (precision, scale, length) {
        (Some(p), Some(s), _) => format!("{}({},{})", type_name, p, s),
        (Some(p), None, _) => format!("{}({})", type_name, p),
        (None, _, Some(l)) => format!("{}({})", type_name, l),
        (None, _, None) => type_name.to_string(),
    }
}

/// Identity and statistics of one table, as produced by the table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Owning schema.
    pub owner: String,
    /// Table name.
    pub table_name: String,
    /// Storage location reported by the catalog, if any.
    pub tablespace: Option<String>,
    /// Catalog status (e.g. `VALID`).
    pub status: Option<String>,
    /// Row count from catalog statistics.
    pub row_count: Option<i64>,
    /// When statistics were last gathered.
    pub last_analyzed_at: Option<NaiveDateTime>,
    /// Normalized table comment (see [`normalize_comment`]).
    #[serde(default = "no_description")]
    pub comment: String,
}

impl TableDescriptor {
    /// Create a descriptor with no statistics and no comment.
    pub fn new(owner: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            table_name: table_name.into(),
            tablespace: None,
            status: None,
            row_count: None,
            last_analyzed_at: None,
            comment: NO_DESCRIPTION.to_string(),
        }
    }

    /// Set the comment, normalizing a missing one.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = normalize_comment(comment);
        self
    }

    /// Set the row count.
    pub fn with_row_count(mut self, rows: i64) -> Self {
        self.row_count = Some(rows);
        self
    }

    /// `OWNER.TABLE` form used in logs, errors and the document index.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.table_name)
    }

    /// Sort key of the document index.
    pub fn sort_key(&self) -> (String, String) {
        (self.owner.clone(), self.table_name.clone())
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.table_name)
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Rendered type, e.g. `NUMBER(10,2)`.
    pub data_type: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<i32>,
    pub nullable: bool,
    /// Default expression, trimmed.
    pub default_value: Option<String>,
    /// Normalized column comment.
    #[serde(default = "no_description")]
    pub comment: String,
    /// 1-based position in the table.
    pub ordinal_position: u32,
}

impl ColumnDescriptor {
    /// Build a column from raw catalog parts, rendering the type and
    /// normalizing the comment.
    #[allow(clippy::too_many_arguments)]
    pub fn from_catalog(
        name: impl Into<String>,
        type_name: &str,
        length: Option<u32>,
        precision: Option<u32>,
        scale: Option<i32>,
        nullable: bool,
        default_value: Option<String>,
        comment: Option<String>,
        ordinal_position: u32,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: render_data_type(type_name, length, precision, scale),
            length,
            precision,
            scale,
            nullable,
            default_value: default_value
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            comment: normalize_comment(comment),
            ordinal_position,
        }
    }
}

/// Primary key columns in key-position order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub columns: Vec<String>,
}

impl KeyDescriptor {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// One column pair of a foreign key constraint.
///
/// Composite keys produce several rows sharing `constraint_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub constraint_name: String,
    pub local_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// One (index, column) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub index_name: String,
    pub index_type: String,
    /// `UNIQUE` or `NONUNIQUE`.
    pub uniqueness: String,
    pub column_name: String,
    pub status: String,
}

/// Complete metadata of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub descriptor: TableDescriptor,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub primary_key: KeyDescriptor,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(default)]
    pub indices: Vec<IndexDescriptor>,
}

impl TableMetadata {
    /// Metadata with only a descriptor; child collections empty.
    pub fn new(descriptor: TableDescriptor) -> Self {
        Self {
            descriptor,
            columns: Vec::new(),
            primary_key: KeyDescriptor::default(),
            foreign_keys: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.descriptor.owner
    }

    pub fn table_name(&self) -> &str {
        &self.descriptor.table_name
    }

    pub fn qualified_name(&self) -> String {
        self.descriptor.qualified_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_precision_and_scale() {
        assert_eq!(render_data_type("NUMBER", Some(22), Some(10), Some(2)), "NUMBER(10,2)");
    }

    #[test]
    fn test_render_precision_only() {
        assert_eq!(render_data_type("NUMBER", Some(22), Some(10), None), "NUMBER(10)");
    }

    #[test]
    fn test_render_length_only() {
        assert_eq!(render_data_type("VARCHAR2", Some(64), None, None), "VARCHAR2(64)");
    }

    #[test]
    fn test_render_bare_type_has_no_parens() {
        assert_eq!(render_data_type("DATE", None, None, None), "DATE");
        assert_eq!(render_data_type("CLOB", Some(0), Some(0), None), "CLOB");
    }

    #[test]
    fn test_render_scale_without_precision_falls_back_to_length() {
        assert_eq!(render_data_type("NUMBER", Some(22), None, Some(0)), "NUMBER(22)");
        assert_eq!(render_data_type("INTEGER", None, None, Some(0)), "INTEGER");
    }

    #[test]
    fn test_missing_comment_uses_sentinel() {
        assert_eq!(normalize_comment(None), NO_DESCRIPTION);
        assert_eq!(normalize_comment(Some(String::new())), "");
        assert!(is_missing_comment(&normalize_comment(None)));
        assert!(!is_missing_comment(""));
    }

    #[test]
    fn test_column_from_catalog() {
        let col = ColumnDescriptor::from_catalog(
            "SALARY",
            "NUMBER",
            Some(22),
            Some(8),
            Some(2),
            true,
            Some("0 \n".to_string()),
            None,
            3,
        );
        assert_eq!(col.data_type, "NUMBER(8,2)");
        assert_eq!(col.default_value.as_deref(), Some("0"));
        assert_eq!(col.comment, NO_DESCRIPTION);
        assert_eq!(col.ordinal_position, 3);
    }

    #[test]
    fn test_blank_default_is_absent() {
        let col = ColumnDescriptor::from_catalog(
            "ID", "NUMBER", None, None, None, false, Some("  ".to_string()), None, 1,
        );
        assert!(col.default_value.is_none());
    }

    #[test]
    fn test_qualified_name() {
        let desc = TableDescriptor::new("HR", "EMP");
        assert_eq!(desc.qualified_name(), "HR.EMP");
        assert_eq!(desc.to_string(), "HR.EMP");
        assert_eq!(desc.sort_key(), ("HR".to_string(), "EMP".to_string()));
    }

    #[test]
    fn test_metadata_serde_defaults() {
        let json = r#"{
            "descriptor": {
                "owner": "HR", "table_name": "DEPT", "tablespace": null, "status": null,
                "row_count": 4, "last_analyzed_at": null, "comment": "Departments"
            },
            "columns": []
        }"#;
        let meta: TableMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.primary_key.is_empty());
        assert!(meta.foreign_keys.is_empty());
        assert_eq!(meta.descriptor.row_count, Some(4));
    }
}
