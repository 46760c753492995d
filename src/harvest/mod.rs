//! Harvest pipeline.
//!
//! Lists the tables of a source catalog, extracts each one concurrently and
//! feeds the results to the document and (optionally) the mirror.
//!
//! # Flow
//!
//! ```text
//!  ConnectionPool::build ──(probe fails)──► abort, nothing written
//!        │
//!        ▼
//!  list_tables (query timeout) ──(empty)──► warn, nothing written
//!        │
//!        ▼
//!  Scheduler::run ── worker ─► extract ─┐
//!                 ── worker ─► extract ─┼─► completion channel
//!                 ── worker ─► extract ─┘          │
//!                                                  ▼
//!                          DocumentSink::write_table + MirrorSink::save_table
//!        │
//!        ├─(any extraction failure)──► abort, document left unfinalized
//!        ▼
//!  DocumentSink::finalize
//! ```
//!
//! Mirror failures are logged and counted; they never abort the run.

mod error;
mod extractor;
mod scheduler;

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};

pub use error::{ExtractionCause, ExtractionError, HarvestError, HarvestResult};
pub use extractor::extract;
pub use scheduler::{
    effective_concurrency, host_parallelism, CancellationToken, Progress, RunSummary, Scheduler,
};

use crate::catalog::{CatalogConnection, ManageConnection, TableFilter};
use crate::document::{ContentRetention, DocumentSink};
use crate::metadata::TableDescriptor;
use crate::mirror::{MirrorConfig, MirrorSink};
use crate::pool::{ConnectionPool, PoolConfig, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_HEADROOM};

/// Everything a harvest run needs besides the catalog itself.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub filter: TableFilter,
    /// Requested number of concurrent extractions.
    pub concurrency: usize,
    /// Timeout of the table listing.
    pub query_timeout: Duration,
    /// Timeout attached to each table's extraction connection.
    pub table_timeout: Duration,
    pub output: PathBuf,
    pub retention: ContentRetention,
    pub pool_headroom: usize,
    pub acquire_timeout: Duration,
    /// `None` writes the document only.
    pub mirror: Option<MirrorConfig>,
}

impl HarvestOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            filter: TableFilter::default(),
            concurrency: 10,
            query_timeout: Duration::from_secs(300),
            table_timeout: Duration::from_secs(60),
            output: output.into(),
            retention: ContentRetention::default(),
            pool_headroom: DEFAULT_HEADROOM,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            mirror: None,
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.concurrency)
            .with_headroom(self.pool_headroom)
            .with_acquire_timeout(self.acquire_timeout)
            .with_call_timeout(self.table_timeout)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub total: usize,
    pub succeeded: usize,
    pub mirrored: usize,
    pub mirror_failures: usize,
    pub concurrency: usize,
    pub elapsed: Duration,
    /// The finalized document; `None` when there was nothing to write.
    pub document: Option<PathBuf>,
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "harvested {}/{} tables with {} workers in {:.2}s",
            self.succeeded,
            self.total,
            self.concurrency,
            self.elapsed.as_secs_f64()
        )?;
        if self.mirrored > 0 || self.mirror_failures > 0 {
            write!(
                f,
                " (mirrored {}, {} mirror failures)",
                self.mirrored, self.mirror_failures
            )?;
        }
        if let Some(path) = &self.document {
            write!(f, " -> {}", path.display())?;
        }
        Ok(())
    }
}

/// Run a full harvest against `manager`'s catalog.
///
/// # Errors
///
/// Fails if the pool cannot be built at the requested concurrency, if the
/// listing fails, if any table fails to extract, or if the document cannot
/// be written. In the last two cases the document is not finalized.
pub fn harvest<M>(manager: M, options: &HarvestOptions) -> HarvestResult<HarvestReport>
where
    M: ManageConnection,
    M::Connection: CatalogConnection,
{
    let started = Instant::now();
    let pool = ConnectionPool::build(manager, options.pool_config())?;
    let result = run(&pool, options, started);
    pool.close();
    result
}

/// List tables with one pooled connection bound by `timeout`.
pub fn list_tables<M>(
    pool: &ConnectionPool<M>,
    filter: &TableFilter,
    timeout: Duration,
) -> HarvestResult<Vec<TableDescriptor>>
where
    M: ManageConnection,
    M::Connection: CatalogConnection,
{
    let mut conn = pool.acquire_for(timeout)?;
    conn.list_tables(filter).map_err(HarvestError::Listing)
}

fn run<M>(
    pool: &ConnectionPool<M>,
    options: &HarvestOptions,
    started: Instant,
) -> HarvestResult<HarvestReport>
where
    M: ManageConnection,
    M::Connection: CatalogConnection,
{
    let tables = list_tables(pool, &options.filter, options.query_timeout)?;
    info!(tables = tables.len(), "tables listed");

    if tables.is_empty() {
        warn!(filter = ?options.filter, "no tables matched; nothing to write");
        return Ok(HarvestReport {
            total: 0,
            succeeded: 0,
            mirrored: 0,
            mirror_failures: 0,
            concurrency: 0,
            elapsed: started.elapsed(),
            document: None,
        });
    }

    let mirror = options
        .mirror
        .as_ref()
        .and_then(|config| match MirrorSink::open(config) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(error = %e, "mirror unavailable; writing the document only");
                None
            }
        });

    let document = DocumentSink::open(&options.output, options.retention)?;
    let scheduler = Scheduler::new(options.concurrency, options.table_timeout);

    let mut mirrored = 0;
    let mut mirror_failures = 0;
    let outcome = scheduler.run(&tables, pool, |metadata| {
        document.write_table(&metadata)?;
        if let Some(mirror) = &mirror {
            if mirror.save_table(&metadata) {
                mirrored += 1;
            } else {
                mirror_failures += 1;
            }
        }
        Ok(())
    });

    if let Some(mirror) = &mirror {
        mirror.close();
    }

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(close_err) = document.close() {
                warn!(error = %close_err, "failed to close unfinalized document");
            }
            return Err(e);
        }
    };

    let path = document.finalize()?;

    Ok(HarvestReport {
        total: tables.len(),
        succeeded: summary.succeeded(),
        mirrored,
        mirror_failures,
        concurrency: summary.concurrency,
        elapsed: started.elapsed(),
        document: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_from_options() {
        let mut options = HarvestOptions::new("out.md");
        options.concurrency = 3;
        options.pool_headroom = 1;
        options.table_timeout = Duration::from_secs(9);

        let config = options.pool_config();
        assert_eq!(config.min_size(), 3);
        assert_eq!(config.max_size(), 4);
        assert_eq!(config.call_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_report_display() {
        let report = HarvestReport {
            total: 2,
            succeeded: 2,
            mirrored: 2,
            mirror_failures: 0,
            concurrency: 2,
            elapsed: Duration::from_millis(1500),
            document: Some(PathBuf::from("schema.md")),
        };
        assert_eq!(
            report.to_string(),
            "harvested 2/2 tables with 2 workers in 1.50s (mirrored 2, 0 mirror failures) -> schema.md"
        );
    }
}
