//! Catalog-specific error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while talking to a source catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Could not open a connection to the catalog.
    #[error("failed to connect to catalog at {path}: {source}")]
    ConnectFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// An introspection query failed.
    #[error("catalog query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A query ran past the per-operation timeout.
    #[error("catalog query exceeded {0:?}")]
    Timeout(Duration),

    /// Snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    SnapshotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file is not valid JSON for the metadata model.
    #[error("failed to parse snapshot: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    /// The requested table does not exist in the catalog.
    #[error("table not found: {owner}.{table}")]
    TableNotFound { owner: String, table: String },

    /// Connection failed its liveness check.
    #[error("connection is not usable: {0}")]
    Unhealthy(String),
}

impl CatalogError {
    /// Check if this error was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
