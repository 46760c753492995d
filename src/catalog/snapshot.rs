//! JSON snapshot catalog driver.
//!
//! A snapshot is a JSON array of [`TableMetadata`] records, typically exported
//! from a catalog that cannot be reached from where the harvest runs. The
//! records are loaded once and shared read-only by every connection.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{CatalogConnection, CatalogError, CatalogResult, ManageConnection, TableFilter};
use crate::metadata::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, TableDescriptor, TableMetadata,
};

/// Connection factory over an in-memory snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    tables: Arc<Vec<TableMetadata>>,
}

impl SnapshotCatalog {
    /// Load a snapshot file.
    pub fn load<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::SnapshotRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse a snapshot from a JSON string.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let tables: Vec<TableMetadata> = serde_json::from_str(json)?;
        Ok(Self::from_tables(tables))
    }

    pub fn from_tables(tables: Vec<TableMetadata>) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl ManageConnection for SnapshotCatalog {
    type Connection = SnapshotConnection;

    fn connect(&self) -> CatalogResult<SnapshotConnection> {
        Ok(SnapshotConnection {
            tables: Arc::clone(&self.tables),
            call_timeout: None,
        })
    }

    fn is_valid(&self, conn: &mut SnapshotConnection) -> CatalogResult<()> {
        conn.ping()
    }

    fn apply_timeout(&self, conn: &mut SnapshotConnection, timeout: Duration) {
        conn.set_call_timeout(timeout);
    }
}

/// Handle onto a shared snapshot.
#[derive(Debug)]
pub struct SnapshotConnection {
    tables: Arc<Vec<TableMetadata>>,
    call_timeout: Option<Duration>,
}

impl SnapshotConnection {
    fn table(&self, owner: &str, table: &str) -> CatalogResult<&TableMetadata> {
        self.tables
            .iter()
            .find(|t| t.owner() == owner && t.table_name() == table)
            .ok_or_else(|| CatalogError::TableNotFound {
                owner: owner.to_string(),
                table: table.to_string(),
            })
    }

    /// Timeout currently attached to this handle.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

impl CatalogConnection for SnapshotConnection {
    fn list_tables(&mut self, filter: &TableFilter) -> CatalogResult<Vec<TableDescriptor>> {
        let mut tables: Vec<TableDescriptor> = self
            .tables
            .iter()
            .filter(|t| filter.matches(t.owner(), t.table_name()))
            .map(|t| t.descriptor.clone())
            .collect();
        tables.sort_by_key(TableDescriptor::sort_key);
        Ok(tables)
    }

    fn columns(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<ColumnDescriptor>> {
        let mut columns = self.table(owner, table)?.columns.clone();
        columns.sort_by_key(|c| c.ordinal_position);
        Ok(columns)
    }

    fn primary_keys(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<String>> {
        Ok(self.table(owner, table)?.primary_key.columns.clone())
    }

    fn foreign_keys(
        &mut self,
        owner: &str,
        table: &str,
    ) -> CatalogResult<Vec<ForeignKeyDescriptor>> {
        let mut keys = self.table(owner, table)?.foreign_keys.clone();
        // Stable: column order inside one constraint is preserved.
        keys.sort_by(|a, b| a.constraint_name.cmp(&b.constraint_name));
        Ok(keys)
    }

    fn indices(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<IndexDescriptor>> {
        let mut indices = self.table(owner, table)?.indices.clone();
        indices.sort_by(|a, b| a.index_name.cmp(&b.index_name));
        Ok(indices)
    }

    fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = Some(timeout);
    }

    fn ping(&mut self) -> CatalogResult<()> {
        Ok(())
    }
}
