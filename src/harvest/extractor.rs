//! Table extractor: one table in, one [`TableMetadata`] out.

use std::time::Duration;

use tracing::debug;

use super::error::ExtractionError;
use crate::catalog::{CatalogConnection, CatalogError, ManageConnection};
use crate::metadata::{KeyDescriptor, TableDescriptor, TableMetadata};
use crate::pool::ConnectionPool;

/// Extract the full metadata of one table.
///
/// Borrows a single connection for the four introspection queries with
/// `timeout` attached. The connection goes back to the pool when this
/// returns, whatever the outcome. Nothing is retried.
///
/// A table that reports no columns is treated as missing, since a table
/// without columns cannot be represented completely.
pub fn extract<M>(
    pool: &ConnectionPool<M>,
    table: &TableDescriptor,
    timeout: Duration,
) -> Result<TableMetadata, ExtractionError>
where
    M: ManageConnection,
    M::Connection: CatalogConnection,
{
    let mut conn = pool
        .acquire_for(timeout)
        .map_err(|e| ExtractionError::new(table, e))?;
    let fail = |e: CatalogError| ExtractionError::new(table, e);

    let owner = table.owner.as_str();
    let name = table.table_name.as_str();

    let columns = conn.columns(owner, name).map_err(fail)?;
    if columns.is_empty() {
        return Err(fail(CatalogError::TableNotFound {
            owner: owner.to_string(),
            table: name.to_string(),
        }));
    }
    let primary_key = KeyDescriptor::new(conn.primary_keys(owner, name).map_err(fail)?);
    let foreign_keys = conn.foreign_keys(owner, name).map_err(fail)?;
    let indices = conn.indices(owner, name).map_err(fail)?;

    debug!(
        table = %table,
        columns = columns.len(),
        foreign_keys = foreign_keys.len(),
        indices = indices.len(),
        "extracted table metadata"
    );

    Ok(TableMetadata {
        descriptor: table.clone(),
        columns,
        primary_key,
        foreign_keys,
        indices,
    })
}
