//! Mirror store error types.

use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to hash table metadata: {0}")]
    Hash(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid table prefix '{0}': must be a plain SQL identifier")]
    InvalidPrefix(String),

    #[error("mirror store is closed")]
    Closed,
}
