//! Bounded connection pool for source catalog connections.
//!
//! The pool is sized to a target concurrency `C`: it keeps at least `C`
//! connections and opens at most `C + headroom`. Building a pool probes it by
//! holding `C` connections at once; if that fails the pool is closed and the
//! error returned, so a run never starts at partial capacity.
//!
//! Connections are handed out as [`PooledConnection`] guards. Dropping a guard
//! returns the connection to the pool on every exit path, including unwinding.
//! Only the pool closes connections.
//!
//! ```text
//!   acquire() ──► idle queue ──► (empty) open new if open < max
//!       │                              └──► (full) wait up to acquire_timeout
//!       ▼
//!   PooledConnection ── Drop ──► idle queue (or discard once closed)
//! ```

mod config;
mod error;

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info};

pub use config::{PoolConfig, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CALL_TIMEOUT, DEFAULT_HEADROOM};
pub use error::{PoolError, PoolResult};

use crate::catalog::ManageConnection;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Connections currently open (idle + checked out).
    pub open: usize,
    /// Connections waiting in the idle queue.
    pub idle: usize,
    pub max_size: usize,
}

/// A bounded, thread-safe pool of catalog connections.
pub struct ConnectionPool<M: ManageConnection> {
    manager: M,
    config: PoolConfig,
    idle_tx: Sender<M::Connection>,
    idle_rx: Receiver<M::Connection>,
    open: AtomicUsize,
    closed: AtomicBool,
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create the pool and probe it at the target concurrency.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Probe`] if `config.concurrency` connections cannot
    /// be open and valid at the same time. The pool is closed before returning.
    pub fn build(manager: M, config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let (idle_tx, idle_rx) = bounded(config.max_size());
        let pool = Self {
            manager,
            config,
            idle_tx,
            idle_rx,
            open: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        };

        info!(
            min = pool.config.min_size(),
            max = pool.config.max_size(),
            "creating connection pool"
        );

        if let Err(e) = pool.probe(pool.config.concurrency) {
            pool.close();
            return Err(e);
        }

        info!(connections = pool.config.concurrency, "connection pool ready");
        Ok(pool)
    }

    /// Hold `wanted` connections at once, checking each, then return them all.
    fn probe(&self, wanted: usize) -> PoolResult<()> {
        let mut held = Vec::with_capacity(wanted);

        for acquired in 0..wanted {
            let probe_err = |source: PoolError| PoolError::Probe {
                acquired,
                wanted,
                source: Box::new(source),
            };

            let mut conn = self.acquire().map_err(probe_err)?;
            self.manager
                .is_valid(&mut conn)
                .map_err(|e| probe_err(PoolError::Unhealthy(e)))?;

            debug!(connection = acquired + 1, wanted, "probe acquired connection");
            held.push(conn);
        }

        Ok(())
    }

    /// Borrow a connection with the pool's default call timeout.
    pub fn acquire(&self) -> PoolResult<PooledConnection<'_, M>> {
        self.acquire_for(self.config.call_timeout)
    }

    /// Borrow a connection with a specific per-operation timeout attached.
    pub fn acquire_for(&self, call_timeout: Duration) -> PoolResult<PooledConnection<'_, M>> {
        let mut conn = self.checkout()?;
        self.manager.apply_timeout(&mut conn, call_timeout);
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    fn checkout(&self) -> PoolResult<M::Connection> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        if let Ok(conn) = self.idle_rx.try_recv() {
            return Ok(conn);
        }

        if self.try_reserve_slot() {
            return self.manager.connect().map_err(|e| {
                self.open.fetch_sub(1, Ordering::SeqCst);
                PoolError::Connect(e)
            });
        }

        match self.idle_rx.recv_timeout(self.config.acquire_timeout) {
            Ok(conn) if self.is_closed() => {
                self.discard(conn);
                Err(PoolError::Closed)
            }
            Ok(conn) => Ok(conn),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::Timeout(self.config.acquire_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Closed),
        }
    }

    fn try_reserve_slot(&self) -> bool {
        let max = self.config.max_size();
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Return a connection for reuse. Never closes it unless the pool is closed.
    fn release(&self, conn: M::Connection) {
        if self.is_closed() {
            self.discard(conn);
            return;
        }

        if let Err(TrySendError::Full(conn) | TrySendError::Disconnected(conn)) =
            self.idle_tx.try_send(conn)
        {
            self.discard(conn);
        }
    }

    fn discard(&self, conn: M::Connection) {
        drop(conn);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// Close the pool: idle connections are dropped now, checked-out ones
    /// when their guards are released. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        while let Ok(conn) = self.idle_rx.try_recv() {
            self.discard(conn);
        }

        info!(
            still_borrowed = self.open.load(Ordering::SeqCst),
            "connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        PoolState {
            open: self.open.load(Ordering::SeqCst),
            idle: self.idle_rx.len(),
            max_size: self.config.max_size(),
        }
    }
}

impl<M: ManageConnection> Drop for ConnectionPool<M> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Returned to the pool when dropped.
pub struct PooledConnection<'a, M: ManageConnection> {
    pool: &'a ConnectionPool<M>,
    conn: Option<M::Connection>,
}

impl<M: ManageConnection> Deref for PooledConnection<'_, M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        // Only `None` inside `drop`.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<'_, M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl<M: ManageConnection> Drop for PooledConnection<'_, M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResult};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;

    /// Opens at most `limit` connections over its lifetime.
    struct CountingManager {
        limit: usize,
        opened: AtomicUsize,
        reject_invalid: bool,
    }

    impl CountingManager {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                opened: AtomicUsize::new(0),
                reject_invalid: false,
            }
        }
    }

    #[derive(Debug)]
    struct TestConn {
        id: usize,
        timeout: Option<Duration>,
    }

    impl ManageConnection for CountingManager {
        type Connection = TestConn;

        fn connect(&self) -> CatalogResult<TestConn> {
            let id = self.opened.fetch_add(1, Ordering::SeqCst);
            if id >= self.limit {
                return Err(CatalogError::Unhealthy("too many connections".to_string()));
            }
            Ok(TestConn { id, timeout: None })
        }

        fn is_valid(&self, _conn: &mut TestConn) -> CatalogResult<()> {
            if self.reject_invalid {
                Err(CatalogError::Unhealthy("ping failed".to_string()))
            } else {
                Ok(())
            }
        }

        fn apply_timeout(&self, conn: &mut TestConn, timeout: Duration) {
            conn.timeout = Some(timeout);
        }
    }

    fn config(concurrency: usize) -> PoolConfig {
        PoolConfig::new(concurrency).with_acquire_timeout(Duration::from_millis(50))
    }

    #[test]
    fn test_build_probes_target_concurrency() {
        let pool = ConnectionPool::build(CountingManager::new(100), config(4)).unwrap();
        let state = pool.state();
        assert_eq!(state.open, 4);
        assert_eq!(state.idle, 4);
        assert_eq!(state.max_size, 6);
    }

    #[test]
    fn test_build_fails_when_capacity_unavailable() {
        let err = ConnectionPool::build(CountingManager::new(3), config(4))
            .err()
            .unwrap();
        match err {
            PoolError::Probe {
                acquired, wanted, ..
            } => {
                assert_eq!(acquired, 3);
                assert_eq!(wanted, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_fails_when_connection_invalid() {
        let mut manager = CountingManager::new(10);
        manager.reject_invalid = true;
        let err = ConnectionPool::build(manager, config(2)).err().unwrap();
        assert!(matches!(err, PoolError::Probe { acquired: 0, .. }));
    }

    #[test]
    fn test_build_rejects_zero_concurrency() {
        let err = ConnectionPool::build(CountingManager::new(10), config(0))
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_acquire_applies_call_timeout() {
        let pool = ConnectionPool::build(CountingManager::new(10), config(1)).unwrap();
        let conn = pool.acquire_for(Duration::from_secs(7)).unwrap();
        assert_eq!(conn.timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_connections_are_reused() {
        let pool = ConnectionPool::build(CountingManager::new(10), config(1)).unwrap();
        let first = pool.acquire().unwrap().id;
        let second = pool.acquire().unwrap().id;
        assert_eq!(first, second);
        assert_eq!(pool.state().open, 1);
    }

    #[test]
    fn test_acquire_times_out_at_max_size() {
        let pool =
            ConnectionPool::build(CountingManager::new(10), config(1).with_headroom(1)).unwrap();
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(PoolError::Timeout(_))));
    }

    #[test]
    fn test_guard_released_on_panic() {
        let pool =
            ConnectionPool::build(CountingManager::new(10), config(1).with_headroom(0)).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _conn = pool.acquire().unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());

        assert_eq!(pool.state().idle, 1);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let pool = ConnectionPool::build(CountingManager::new(10), config(2)).unwrap();
        let borrowed = pool.acquire().unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.state().idle, 0);
        assert_eq!(pool.state().open, 1);
        assert!(matches!(pool.acquire(), Err(PoolError::Closed)));

        drop(borrowed);
        assert_eq!(pool.state().open, 0);

        // Idempotent.
        pool.close();
    }
}
