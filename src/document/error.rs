//! Document sink error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to create document {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write document: {0}")]
    Write(#[from] io::Error),

    /// Building the rewritten document failed. The original is untouched.
    #[error("failed to rewrite document into {path}: {source}")]
    Rewrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The rewritten document could not replace the original.
    #[error("failed to replace {to} with {from}: {source}")]
    Replace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("document already finalized")]
    Finalized,

    #[error("document is closed")]
    Closed,

    /// An earlier write failed part way, so recorded offsets can no longer
    /// be trusted.
    #[error("document output failed earlier and cannot be written")]
    Failed,
}
