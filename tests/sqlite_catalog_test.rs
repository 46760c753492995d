//! SQLite catalog driver against a real database file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbscribe::catalog::{
    CatalogConnection, CatalogError, ManageConnection, SqliteCatalog, TableFilter,
};
use dbscribe::harvest::{extract, harvest, HarvestError, HarvestOptions};
use dbscribe::metadata::TableDescriptor;
use dbscribe::pool::{ConnectionPool, PoolConfig, PoolError};
use rusqlite::Connection;
use tempfile::TempDir;

fn create_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE dept (
             id INTEGER PRIMARY KEY,
             name VARCHAR(40) NOT NULL UNIQUE
         );
         CREATE TABLE emp (
             id INTEGER PRIMARY KEY,
             name VARCHAR(64) NOT NULL,
             salary DECIMAL(10,2) DEFAULT 0,
             dept_id INTEGER REFERENCES dept(id),
             hired DATE
         );
         CREATE INDEX emp_name_ix ON emp(name);
         CREATE INDEX emp_dept_hired_ix ON emp(dept_id, hired);
         INSERT INTO dept (name) VALUES ('Sales'), ('Research');
         INSERT INTO emp (name, salary, dept_id) VALUES
             ('Ada', 100.5, 1), ('Brian', 90, 2), ('Cy', 80, 2);",
    )
    .unwrap();
    conn.close().unwrap();

    (dir, path)
}

fn connect(path: &Path) -> <SqliteCatalog as ManageConnection>::Connection {
    let catalog = SqliteCatalog::new(path);
    let mut conn = catalog.connect().unwrap();
    catalog.apply_timeout(&mut conn, Duration::from_secs(10));
    conn
}

#[test]
fn test_list_tables() {
    let (_dir, path) = create_db();
    let mut conn = connect(&path);

    let tables = conn.list_tables(&TableFilter::default()).unwrap();
    let names: Vec<String> = tables.iter().map(|t| t.qualified_name()).collect();
    assert_eq!(names, ["main.dept", "main.emp"]);
    assert_eq!(tables[0].row_count, Some(2));
    assert_eq!(tables[1].row_count, Some(3));
    assert_eq!(tables[1].status.as_deref(), Some("VALID"));
    assert!(tables[1].tablespace.is_some());

    let filtered = conn
        .list_tables(&TableFilter::new(Some("main".to_string()), Some("em".to_string())))
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].table_name, "emp");

    let other_owner = conn
        .list_tables(&TableFilter::new(Some("HR".to_string()), None))
        .unwrap();
    assert!(other_owner.is_empty());
}

#[test]
fn test_list_tables_keeps_sqlite_like_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sqlitebrowser_prefs (k TEXT);
         CREATE TABLE SQLITEDATA (v TEXT);
         CREATE TABLE orders (id INTEGER PRIMARY KEY);
         CREATE TABLE t (x TEXT);
         ANALYZE;",
    )
    .unwrap();
    conn.close().unwrap();

    let mut conn = connect(&path);
    let tables = conn.list_tables(&TableFilter::default()).unwrap();
    let mut names: Vec<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
    names.sort_unstable();
    // ANALYZE creates the reserved sqlite_stat1, which stays hidden.
    assert_eq!(names, ["SQLITEDATA", "orders", "sqlitebrowser_prefs", "t"]);
}

#[test]
fn test_call_timeout_interrupts_listing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many.db");
    let conn = Connection::open(&path).unwrap();
    let ddl: String = (0..400)
        .map(|i| format!("CREATE TABLE t{i:03} (id INTEGER PRIMARY KEY);\n"))
        .collect();
    conn.execute_batch(&ddl).unwrap();
    conn.close().unwrap();

    let catalog = SqliteCatalog::new(&path);
    let mut conn = catalog.connect().unwrap();
    catalog.apply_timeout(&mut conn, Duration::from_nanos(1));
    let err = conn.list_tables(&TableFilter::default()).unwrap_err();
    assert!(matches!(err, CatalogError::Timeout(_)), "unexpected error: {err}");
    assert!(err.is_timeout());

    // The same connection works again once the deadline is generous.
    catalog.apply_timeout(&mut conn, Duration::from_secs(10));
    assert_eq!(conn.list_tables(&TableFilter::default()).unwrap().len(), 400);
}

#[test]
fn test_extract_times_out_and_returns_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.db");
    let conn = Connection::open(&path).unwrap();
    let columns: Vec<String> = (0..1500).map(|i| format!("c{i:04} TEXT")).collect();
    conn.execute_batch(&format!("CREATE TABLE wide ({});", columns.join(", ")))
        .unwrap();
    conn.close().unwrap();

    let pool = ConnectionPool::build(SqliteCatalog::new(&path), PoolConfig::new(1)).unwrap();
    let wide = TableDescriptor::new("main", "wide");

    let err = extract(&pool, &wide, Duration::from_nanos(1)).unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert_eq!(err.table, "main.wide");
    assert_eq!(pool.state().idle, 1);

    let metadata = extract(&pool, &wide, Duration::from_secs(10)).unwrap();
    assert_eq!(metadata.columns.len(), 1500);
}

#[test]
fn test_columns() {
    let (_dir, path) = create_db();
    let mut conn = connect(&path);

    let columns = conn.columns("main", "emp").unwrap();
    let summary: Vec<(u32, &str, &str, bool)> = columns
        .iter()
        .map(|c| {
            (
                c.ordinal_position,
                c.name.as_str(),
                c.data_type.as_str(),
                c.nullable,
            )
        })
        .collect();
    assert_eq!(
        summary,
        [
            (1, "id", "INTEGER", true),
            (2, "name", "VARCHAR(64)", false),
            (3, "salary", "DECIMAL(10,2)", true),
            (4, "dept_id", "INTEGER", true),
            (5, "hired", "DATE", true),
        ]
    );
    assert_eq!(columns[2].default_value.as_deref(), Some("0"));
    assert_eq!(columns[2].precision, Some(10));
    assert_eq!(columns[2].scale, Some(2));
    assert_eq!(columns[1].length, Some(64));
    assert_eq!(columns[0].comment, "No description");

    assert!(conn.columns("main", "missing").unwrap().is_empty());
}

#[test]
fn test_keys_and_indices() {
    let (_dir, path) = create_db();
    let mut conn = connect(&path);

    assert_eq!(conn.primary_keys("main", "emp").unwrap(), ["id"]);

    let fks = conn.foreign_keys("main", "emp").unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].constraint_name, "fk_emp_0");
    assert_eq!(fks[0].local_column, "dept_id");
    assert_eq!(fks[0].referenced_table, "dept");
    assert_eq!(fks[0].referenced_column, "id");
    assert!(conn.foreign_keys("main", "dept").unwrap().is_empty());

    let indices = conn.indices("main", "emp").unwrap();
    let rows: Vec<(&str, &str)> = indices
        .iter()
        .map(|i| (i.index_name.as_str(), i.column_name.as_str()))
        .collect();
    assert_eq!(
        rows,
        [
            ("emp_dept_hired_ix", "dept_id"),
            ("emp_dept_hired_ix", "hired"),
            ("emp_name_ix", "name"),
        ]
    );
    assert!(indices
        .iter()
        .all(|i| i.index_type == "NORMAL" && i.uniqueness == "NONUNIQUE"));

    let dept_indices = conn.indices("main", "dept").unwrap();
    assert_eq!(dept_indices.len(), 1);
    assert_eq!(dept_indices[0].index_type, "UNIQUE CONSTRAINT");
    assert_eq!(dept_indices[0].uniqueness, "UNIQUE");
    assert_eq!(dept_indices[0].column_name, "name");
}

#[test]
fn test_harvest_sqlite_file() {
    let (dir, path) = create_db();
    let mut options = HarvestOptions::new(dir.path().join("schema.md"));
    options.concurrency = 2;

    let report = harvest(SqliteCatalog::new(&path), &options).unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 2);

    let text = fs::read_to_string(&options.output).unwrap();
    assert!(text.contains("- [main.dept](#main.dept)"));
    assert!(text.contains("- [main.emp](#main.emp)"));
    assert!(text.contains("| 3 | salary | DECIMAL(10,2) | YES | 0 | No description |"));
    assert!(text.contains("| fk_emp_0 | dept_id | dept | id |"));
    assert!(text.contains("**Rows**: 3"));
}

#[test]
fn test_missing_file_fails_probe() {
    let dir = tempfile::tempdir().unwrap();
    let options = HarvestOptions::new(dir.path().join("schema.md"));

    let err = harvest(SqliteCatalog::new(dir.path().join("absent.db")), &options).unwrap_err();
    match err {
        HarvestError::Pool(PoolError::Probe {
            acquired, source, ..
        }) => {
            assert_eq!(acquired, 0);
            assert!(matches!(*source, PoolError::Connect(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!options.output.exists());
}
