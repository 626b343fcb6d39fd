//! Connection pool sizing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on live sessions, idle or in use.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long `acquire` may wait for a free slot. Unbounded when absent.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

const fn default_max_connections() -> usize {
    4
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            acquire_timeout_ms: None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}
