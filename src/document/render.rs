//! Markdown rendering for the schema document.

use std::fmt::Write;

use crate::metadata::{TableDescriptor, TableMetadata};

pub const TITLE: &str = "# Database Schema Reference";
pub const TOC_HEADING: &str = "## Tables";
/// Heading separating the table of contents from the table sections.
pub const DETAIL_MARKER: &str = "## Table Details";

/// Document title, timestamp line and the table-of-contents heading.
pub fn header(label: &str, timestamp: &str) -> String {
    format!("{TITLE}\n\n*{label}: {timestamp}*\n\n{TOC_HEADING}\n\n")
}

/// The detail-section heading, with the blank lines around it.
pub fn detail_marker() -> String {
    format!("\n{DETAIL_MARKER}\n\n")
}

/// Link target for a table: `OWNER.TABLE` with case kept.
///
/// Characters outside `[A-Za-z0-9_]` become `-<hex>-`, so `.` only ever
/// separates the two names and distinct tables never share an anchor.
pub fn anchor(owner: &str, table: &str) -> String {
    let mut out = String::with_capacity(owner.len() + table.len() + 1);
    escape_anchor_part(&mut out, owner);
    out.push('.');
    escape_anchor_part(&mut out, table);
    out
}

fn escape_anchor_part(out: &mut String, part: &str) {
    for c in part.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            let _ = write!(out, "-{:x}-", c as u32);
        }
    }
}

/// One table-of-contents line.
pub fn toc_entry(descriptor: &TableDescriptor) -> String {
    format!(
        "- [{}.{}](#{}) - {}\n",
        descriptor.owner,
        descriptor.table_name,
        anchor(&descriptor.owner, &descriptor.table_name),
        cell(&descriptor.comment)
    )
}

/// Full section for one table.
///
/// Key, foreign key and index tables are left out when empty.
pub fn section(metadata: &TableMetadata) -> String {
    let d = &metadata.descriptor;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "<a id=\"{}\"></a>", anchor(&d.owner, &d.table_name));
    let _ = writeln!(out, "### {}.{}\n", d.owner, d.table_name);
    let _ = writeln!(out, "**Comment**: {}\n", cell(&d.comment));
    let _ = writeln!(out, "**Rows**: {}\n", or_dash(d.row_count.map(|r| r.to_string())));
    let _ = writeln!(
        out,
        "**Last analyzed**: {}\n",
        or_dash(d.last_analyzed_at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()))
    );
    if let Some(tablespace) = &d.tablespace {
        let _ = writeln!(out, "**Tablespace**: {}\n", cell(tablespace));
    }
    if let Some(status) = &d.status {
        let _ = writeln!(out, "**Status**: {}\n", cell(status));
    }

    out.push_str("#### Columns\n\n");
    out.push_str("| # | Name | Type | Nullable | Default | Comment |\n");
    out.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for c in &metadata.columns {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            c.ordinal_position,
            cell(&c.name),
            cell(&c.data_type),
            if c.nullable { "YES" } else { "NO" },
            c.default_value.as_deref().map(cell).unwrap_or_else(|| "-".to_string()),
            cell(&c.comment)
        );
    }

    if !metadata.primary_key.is_empty() {
        out.push_str("\n#### Primary Key\n\n");
        out.push_str("| Column |\n");
        out.push_str("| --- |\n");
        for column in &metadata.primary_key.columns {
            let _ = writeln!(out, "| {} |", cell(column));
        }
    }

    if !metadata.foreign_keys.is_empty() {
        out.push_str("\n#### Foreign Keys\n\n");
        out.push_str("| Constraint | Column | References | Referenced Column |\n");
        out.push_str("| --- | --- | --- | --- |\n");
        for fk in &metadata.foreign_keys {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                cell(&fk.constraint_name),
                cell(&fk.local_column),
                cell(&fk.referenced_table),
                cell(&fk.referenced_column)
            );
        }
    }

    if !metadata.indices.is_empty() {
        out.push_str("\n#### Indexes\n\n");
        out.push_str("| Index | Type | Uniqueness | Column | Status |\n");
        out.push_str("| --- | --- | --- | --- | --- |\n");
        for idx in &metadata.indices {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                cell(&idx.index_name),
                cell(&idx.index_type),
                cell(&idx.uniqueness),
                cell(&idx.column_name),
                cell(&idx.status)
            );
        }
    }

    out.push('\n');
    out
}

/// Make a value safe inside a Markdown table cell. Empty becomes `-`.
fn cell(value: &str) -> String {
    if value.trim().is_empty() {
        return "-".to_string();
    }
    value
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace('\n', " ")
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnDescriptor, ForeignKeyDescriptor, KeyDescriptor};
    use insta::assert_snapshot;

    fn emp() -> TableMetadata {
        let descriptor = TableDescriptor::new("HR", "EMP")
            .with_comment(Some("Employees".to_string()))
            .with_row_count(14);
        let mut metadata = TableMetadata::new(descriptor);
        metadata.columns = vec![
            ColumnDescriptor::from_catalog(
                "ID", "NUMBER", None, Some(6), None, false, None,
                Some("Employee id".to_string()), 1,
            ),
            ColumnDescriptor::from_catalog(
                "DEPT_ID", "NUMBER", None, Some(4), None, true, None, None, 2,
            ),
            ColumnDescriptor::from_catalog(
                "NOTE", "VARCHAR2", Some(200), None, None, true,
                Some(" 'n/a' ".to_string()), Some(String::new()), 3,
            ),
        ];
        metadata.primary_key = KeyDescriptor::new(vec!["ID".to_string()]);
        metadata.foreign_keys = vec![ForeignKeyDescriptor {
            constraint_name: "FK_EMP_DEPT".to_string(),
            local_column: "DEPT_ID".to_string(),
            referenced_table: "DEPT".to_string(),
            referenced_column: "ID".to_string(),
        }];
        metadata
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("HR", "EMP"), "HR.EMP");
        assert_eq!(anchor("app", "order items"), "app.order-20-items");
    }

    #[test]
    fn test_anchor_distinct_for_distinct_tables() {
        assert_ne!(anchor("a", "b-c"), anchor("a-b", "c"));
        assert_ne!(anchor("a", "b.c"), anchor("a.b", "c"));
        assert_ne!(anchor("HR", "EMP"), anchor("hr", "emp"));
        assert_eq!(anchor("a", "b-c"), "a.b-2d-c");
        assert_eq!(anchor("a-b", "c"), "a-2d-b.c");
    }

    #[test]
    fn test_toc_entry() {
        let descriptor = TableDescriptor::new("HR", "DEPT");
        assert_eq!(
            toc_entry(&descriptor),
            "- [HR.DEPT](#HR.DEPT) - No description\n"
        );
    }

    #[test]
    fn test_cell_escapes_pipes() {
        assert_eq!(cell("a|b"), "a\\|b");
        assert_eq!(cell("line\nbreak"), "line break");
        assert_eq!(cell("  "), "-");
    }

    #[test]
    fn test_section_emp() {
        assert_snapshot!(section(&emp()), @r###"
        <a id="HR.EMP"></a>
        ### HR.EMP

        **Comment**: Employees

        **Rows**: 14

        **Last analyzed**: -

        #### Columns

        | # | Name | Type | Nullable | Default | Comment |
        | --- | --- | --- | --- | --- | --- |
        | 1 | ID | NUMBER(6) | NO | - | Employee id |
        | 2 | DEPT_ID | NUMBER(4) | YES | - | No description |
        | 3 | NOTE | VARCHAR2(200) | YES | 'n/a' | - |

        #### Primary Key

        | Column |
        | --- |
        | ID |

        #### Foreign Keys

        | Constraint | Column | References | Referenced Column |
        | --- | --- | --- | --- |
        | FK_EMP_DEPT | DEPT_ID | DEPT | ID |
        "###);
    }

    #[test]
    fn test_empty_collections_are_omitted() {
        let mut metadata = emp();
        metadata.primary_key = KeyDescriptor::default();
        metadata.foreign_keys.clear();

        let out = section(&metadata);
        assert!(out.contains("#### Columns"));
        assert!(!out.contains("#### Primary Key"));
        assert!(!out.contains("#### Foreign Keys"));
        assert!(!out.contains("#### Indexes"));
        assert!(out.ends_with("|\n\n"));
    }
}
