use std::time::Duration;

use super::error::{PoolError, PoolResult};

/// Extra connections allowed above the target concurrency.
pub const DEFAULT_HEADROOM: usize = 2;

/// How long `acquire` waits for a connection to come back.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-operation timeout attached to connections by plain `acquire`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Sizing and timeouts of a [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Target concurrency `C`; also the number of connections probed at startup.
    pub concurrency: usize,
    /// Connections allowed above `C`.
    pub headroom: usize,
    pub acquire_timeout: Duration,
    pub call_timeout: Duration,
}

impl PoolConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            headroom: DEFAULT_HEADROOM,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_headroom(mut self, headroom: usize) -> Self {
        self.headroom = headroom;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn min_size(&self) -> usize {
        self.concurrency
    }

    pub fn max_size(&self) -> usize {
        self.concurrency + self.headroom
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.concurrency == 0 {
            return Err(PoolError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "acquire timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
