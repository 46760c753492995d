//! # dbscribe
//!
//! Harvests a database dictionary into a Markdown reference and a queryable
//! SQLite mirror.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Source Catalog (catalog)                 │
//! │         SQLite pragmas  |  JSON metadata snapshot        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [pool: C connections, probed]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Fan-out Scheduler (harvest)                   │
//! │   worker threads ─► extract ─► completion channel        │
//! └─────────────────────────────────────────────────────────┘
//!                          │ TableMetadata, completion order
//!            ┌─────────────┴──────────────┐
//!            ▼                            ▼
//! ┌──────────────────────┐    ┌──────────────────────────────┐
//! │  DocumentSink        │    │  MirrorSink                   │
//! │  streamed sections,  │    │  one transaction per table,   │
//! │  sorted on finalize  │    │  delete-then-reinsert         │
//! └──────────────────────┘    └──────────────────────────────┘
//!                                         │
//!                                         ▼ [MirrorReader]
//!                              CLI `show` / `search`, HTTP API
//! ```

pub mod catalog;
pub mod config;
pub mod document;
pub mod harvest;
pub mod metadata;
pub mod mirror;
pub mod pool;

#[cfg(feature = "api")]
pub mod web;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{
        CatalogConnection, CatalogError, ManageConnection, SnapshotCatalog, SqliteCatalog,
        TableFilter,
    };
    pub use crate::config::{Settings, SourceDriver};
    pub use crate::document::{ContentRetention, DocumentSink};
    pub use crate::harvest::{harvest, HarvestError, HarvestOptions, HarvestReport, Scheduler};
    pub use crate::metadata::{
        ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, KeyDescriptor, TableDescriptor,
        TableMetadata,
    };
    pub use crate::mirror::{MirrorConfig, MirrorReader, MirrorSchema, MirrorSink};
    pub use crate::pool::{ConnectionPool, PoolConfig, PoolError};
}
