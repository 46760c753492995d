//! SQLite mirror of harvested metadata.
//!
//! The mirror holds one parent row per table, unique on `(owner, table_name)`,
//! and four child relations that reference it and cascade on delete:
//!
//! ```text
//! {prefix}tables ──┬── {prefix}columns
//!                  ├── {prefix}primary_keys
//!                  ├── {prefix}foreign_keys
//!                  └── {prefix}indices
//! ```
//!
//! [`MirrorSink`] writes it during a harvest, one transaction per table.
//! [`MirrorReader`] serves the CLI lookups and the query API.

mod error;
mod hash;
mod reader;
mod schema;
mod sink;

pub use error::{MirrorError, MirrorResult};
pub use hash::content_hash;
pub use reader::{
    ColumnRow, ForeignKeyRow, IndexRow, MirrorReader, TableDetail, TableSummary, SEARCH_LIMIT,
};
pub use schema::{MirrorSchema, DEFAULT_TABLE_PREFIX};
pub use sink::{MirrorConfig, MirrorSink};
