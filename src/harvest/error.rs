//! Harvest error types.

use std::any::Any;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::document::DocumentError;
use crate::metadata::TableDescriptor;
use crate::pool::PoolError;

/// Result type for pipeline operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Underlying reason an extraction failed.
#[derive(Error, Debug)]
pub enum ExtractionCause {
    /// No connection could be borrowed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A catalog query failed or timed out.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The worker panicked while extracting.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// A failed extraction of one table.
#[derive(Error, Debug)]
#[error("extraction of {table} failed: {cause}")]
pub struct ExtractionError {
    /// `OWNER.TABLE` of the offending table.
    pub table: String,
    #[source]
    pub cause: ExtractionCause,
}

impl ExtractionError {
    pub fn new(table: &TableDescriptor, cause: impl Into<ExtractionCause>) -> Self {
        Self {
            table: table.qualified_name(),
            cause: cause.into(),
        }
    }

    /// Build from a caught panic payload.
    pub fn panicked(table: &TableDescriptor, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::new(table, ExtractionCause::Panicked(message))
    }

    pub fn is_timeout(&self) -> bool {
        match &self.cause {
            ExtractionCause::Catalog(e) => e.is_timeout(),
            ExtractionCause::Pool(PoolError::Timeout(_)) => true,
            _ => false,
        }
    }
}

/// Errors that abort a harvest run.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The pool could not be built at the requested concurrency.
    #[error("connection pool unavailable: {0}")]
    Pool(#[from] PoolError),

    /// Listing tables failed.
    #[error("failed to list tables: {0}")]
    Listing(#[source] CatalogError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Writing the document failed.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The run was cancelled before every table was processed.
    #[error("harvest cancelled after {completed} of {total} tables")]
    Cancelled { completed: usize, total: usize },
}

impl HarvestError {
    /// The failing table, when the abort is tied to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            HarvestError::Extraction(e) => Some(&e.table),
            _ => None,
        }
    }
}
