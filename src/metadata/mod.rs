//! Metadata model.
//!
//! Rust-native representations of the dictionary records harvested from a
//! source catalog. A [`TableMetadata`] is the unit of work for the whole
//! pipeline: it is built by exactly one extraction task, then handed by
//! shared reference to the document and mirror sinks.
//!
//! # Shape
//!
//! ```text
//! TableMetadata
//! ├── TableDescriptor        (owner, name, tablespace, status, rows, analyzed, comment)
//! ├── Vec<ColumnDescriptor>  ordered by ordinal_position
//! ├── KeyDescriptor          primary key columns in key order
//! ├── Vec<ForeignKeyDescriptor>  one row per column pair
//! └── Vec<IndexDescriptor>       one row per (index, column)
//! ```

mod types;

pub use types::*;
