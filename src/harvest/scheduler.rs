//! Fan-out scheduler.
//!
//! Tables are queued up front; a fixed set of scoped worker threads pulls
//! them, runs [`extract`] and pushes each result onto a completion channel.
//! The calling thread drains that channel in completion order and hands
//! every successful [`TableMetadata`] to the caller's sink callback.
//!
//! The first failure stops the run: workers stop taking new tables but
//! finish the one they hold, so every borrowed connection is returned before
//! `run` comes back. That stop is local to the run. A caller's
//! [`CancellationToken`] stops runs the same way and stays set until reset.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use tracing::{debug, error, info};

use super::error::{ExtractionError, HarvestError, HarvestResult};
use super::extractor::extract;
use crate::catalog::{CatalogConnection, ManageConnection};
use crate::metadata::{TableDescriptor, TableMetadata};
use crate::pool::ConnectionPool;

/// Shared flag asking workers to stop picking up tables.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a cancellation so later runs proceed.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Running counters of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    /// Extraction tasks that finished, successfully or not.
    pub completed: usize,
    /// Tables extracted and accepted by the sink.
    pub succeeded: usize,
}

/// Outcome of a run where every table was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub progress: Progress,
    /// Worker threads actually used.
    pub concurrency: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.progress.succeeded
    }
}

/// Upper bound on workers derived from the host.
pub fn host_parallelism() -> usize {
    num_cpus::get().saturating_mul(2)
}

/// Workers used for a run: the smallest of the requested concurrency, the
/// number of tables, the pool's maximum size and the host ceiling. Never
/// below one.
pub fn effective_concurrency(requested: usize, tables: usize, pool_max: usize) -> usize {
    requested
        .min(tables)
        .min(pool_max)
        .min(host_parallelism())
        .max(1)
}

/// Dispatches extraction tasks over a worker pool.
#[derive(Debug, Clone)]
pub struct Scheduler {
    concurrency: usize,
    table_timeout: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(concurrency: usize, table_timeout: Duration) -> Self {
        Self {
            concurrency,
            table_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this scheduler's runs. Once cancelled, every run
    /// returns [`HarvestError::Cancelled`] until the token is reset.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Extract every table and pass each result to `on_table` as it completes.
    ///
    /// # Errors
    ///
    /// Any extraction failure, or an error returned by `on_table`, aborts the
    /// run: no further results are delivered and the first error is returned
    /// once in-flight workers have finished. An external cancellation yields
    /// [`HarvestError::Cancelled`].
    pub fn run<M, F>(
        &self,
        tables: &[TableDescriptor],
        pool: &ConnectionPool<M>,
        mut on_table: F,
    ) -> HarvestResult<RunSummary>
    where
        M: ManageConnection,
        M::Connection: CatalogConnection,
        F: FnMut(TableMetadata) -> HarvestResult<()>,
    {
        let total = tables.len();
        let workers = effective_concurrency(self.concurrency, total, pool.max_size());
        let progress = Mutex::new(Progress {
            total,
            ..Progress::default()
        });

        info!(tables = total, workers, "starting extraction");

        let (job_tx, job_rx) = unbounded::<&TableDescriptor>();
        for table in tables {
            // Receiver is alive; cannot fail.
            let _ = job_tx.send(table);
        }
        drop(job_tx);

        let (done_tx, done_rx) = unbounded::<Result<TableMetadata, ExtractionError>>();
        let timeout = self.table_timeout;
        let aborted = AtomicBool::new(false);

        let first_error = thread::scope(|scope| -> Option<HarvestError> {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let cancel = &self.cancel;
                let aborted = &aborted;
                let progress = &progress;

                let spawned = thread::Builder::new()
                    .name(format!("harvest-{worker}"))
                    .spawn_scoped(scope, move || {
                        for table in job_rx.iter() {
                            if cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                                break;
                            }
                            let result = catch_unwind(AssertUnwindSafe(|| {
                                extract(pool, table, timeout)
                            }))
                            .unwrap_or_else(|payload| Err(ExtractionError::panicked(table, payload)));

                            progress
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .completed += 1;

                            if done_tx.send(result).is_err() {
                                break;
                            }
                        }
                        debug!(worker, "worker finished");
                    });

                if let Err(e) = spawned {
                    aborted.store(true, Ordering::SeqCst);
                    return Some(HarvestError::Spawn(e));
                }
            }
            drop(done_tx);

            let mut first_error = None;
            for result in done_rx.iter() {
                if first_error.is_some() {
                    // Draining only; in-flight siblings are finishing.
                    continue;
                }

                let outcome = result
                    .map_err(HarvestError::from)
                    .and_then(|metadata| {
                        let name = metadata.qualified_name();
                        on_table(metadata).map(|()| name)
                    });

                match outcome {
                    Ok(name) => {
                        let mut p = progress.lock().unwrap_or_else(PoisonError::into_inner);
                        p.succeeded += 1;
                        info!("[{}/{}] extracted {}", p.succeeded, p.total, name);
                    }
                    Err(e) => {
                        error!(table = e.table().unwrap_or("-"), error = %e, "aborting harvest");
                        aborted.store(true, Ordering::SeqCst);
                        first_error = Some(e);
                    }
                }
            }
            first_error
        });

        let progress = progress.into_inner().unwrap_or_else(PoisonError::into_inner);

        if let Some(e) = first_error {
            return Err(e);
        }
        if progress.completed < total {
            return Err(HarvestError::Cancelled {
                completed: progress.completed,
                total,
            });
        }

        info!(
            succeeded = progress.succeeded,
            total, "extraction complete"
        );
        Ok(RunSummary {
            progress,
            concurrency: workers,
        })
    }
}
