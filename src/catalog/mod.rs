//! Source catalog module.
//!
//! A catalog is the source database's self-describing dictionary. This module
//! defines the seam the rest of the crate talks to and ships two drivers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    ManageConnection                        │
//! │  connect() / is_valid() / apply_timeout()   (used by pool) │
//! └────────────────────────────────────────────────────────────┘
//!                           │ produces
//!                           ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                   CatalogConnection                        │
//! │  list_tables()  columns()  primary_keys()                  │
//! │  foreign_keys() indices()  set_call_timeout()  ping()      │
//! └────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//!   SqliteCatalog (pragma introspection)   SnapshotCatalog (JSON)
//! ```

mod error;
pub mod snapshot;
pub mod sqlite;

use std::time::Duration;

pub use error::{CatalogError, CatalogResult};
pub use snapshot::{SnapshotCatalog, SnapshotConnection};
pub use sqlite::{SqliteCatalog, SqliteConnection};

use crate::metadata::{ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, TableDescriptor};

/// Owners that never show up in a table listing.
pub const SYSTEM_OWNERS: &[&str] = &["SYS", "SYSTEM", "temp"];

/// Filter applied to the table listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    /// Exact owner match.
    pub owner: Option<String>,
    /// Substring match on the table name.
    pub table: Option<String>,
}

impl TableFilter {
    pub fn new(owner: Option<String>, table: Option<String>) -> Self {
        Self {
            owner: owner.filter(|o| !o.is_empty()),
            table: table.filter(|t| !t.is_empty()),
        }
    }

    /// Whether a table passes this filter.
    pub fn matches(&self, owner: &str, table: &str) -> bool {
        if SYSTEM_OWNERS.contains(&owner) {
            return false;
        }
        if let Some(wanted) = &self.owner {
            if wanted != owner {
                return false;
            }
        }
        match &self.table {
            Some(fragment) => table.contains(fragment.as_str()),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.table.is_none()
    }
}

/// A live connection to a source catalog.
///
/// Every query is read-only and scoped by `(owner, table)`. Rows come back in
/// the orders the document and mirror rely on.
pub trait CatalogConnection: Send {
    /// List tables, ordered by owner then table name.
    fn list_tables(&mut self, filter: &TableFilter) -> CatalogResult<Vec<TableDescriptor>>;

    /// Columns ordered by ordinal position.
    fn columns(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<ColumnDescriptor>>;

    /// Primary key column names ordered by key position.
    fn primary_keys(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<String>>;

    /// Foreign key column pairs ordered by constraint name, then position.
    fn foreign_keys(&mut self, owner: &str, table: &str)
        -> CatalogResult<Vec<ForeignKeyDescriptor>>;

    /// Index column pairs ordered by index name, then column position.
    fn indices(&mut self, owner: &str, table: &str) -> CatalogResult<Vec<IndexDescriptor>>;

    /// Bound every subsequent query on this connection.
    fn set_call_timeout(&mut self, timeout: Duration);

    /// Cheap round trip proving the connection works.
    fn ping(&mut self) -> CatalogResult<()>;
}

/// Factory used by the pool to open and check connections.
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection.
    fn connect(&self) -> CatalogResult<Self::Connection>;

    /// Liveness check run by the pool's startup probe.
    fn is_valid(&self, conn: &mut Self::Connection) -> CatalogResult<()>;

    /// Attach a per-operation timeout before the connection is handed out.
    fn apply_timeout(&self, conn: &mut Self::Connection, timeout: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_owner_exact() {
        let filter = TableFilter::new(Some("HR".to_string()), None);
        assert!(filter.matches("HR", "EMP"));
        assert!(!filter.matches("HRX", "EMP"));
    }

    #[test]
    fn test_filter_table_substring() {
        let filter = TableFilter::new(None, Some("EM".to_string()));
        assert!(filter.matches("HR", "EMP"));
        assert!(filter.matches("HR", "TEMP_LOG"));
        assert!(!filter.matches("HR", "DEPT"));
    }

    #[test]
    fn test_filter_skips_system_owners() {
        let filter = TableFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.matches("SYS", "OBJ$"));
        assert!(!filter.matches("SYSTEM", "HELP"));
        assert!(filter.matches("main", "orders"));
    }

    #[test]
    fn test_filter_blank_values_ignored() {
        let filter = TableFilter::new(Some(String::new()), Some(String::new()));
        assert!(filter.is_empty());
    }
}
