//! Pool-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::catalog::CatalogError;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by the connection pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// Opening a new connection failed.
    #[error("failed to open connection: {0}")]
    Connect(#[source] CatalogError),

    /// A connection failed its liveness check.
    #[error("connection failed liveness check: {0}")]
    Unhealthy(#[source] CatalogError),

    /// No connection came back within the acquire timeout.
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// The pool has been closed.
    #[error("connection pool is closed")]
    Closed,

    /// The startup probe could not hold the advertised number of connections.
    #[error("pool could only provide {acquired} of {wanted} connections: {source}")]
    Probe {
        acquired: usize,
        wanted: usize,
        #[source]
        source: Box<PoolError>,
    },

    /// Sizing or timeouts are unusable.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}
