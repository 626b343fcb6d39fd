//! Send queue sizing, throughput and retry settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Messages that may wait before `enqueue` reports the queue as full.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Concurrent delivery workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Aggregate send rate across all workers.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Sends allowed back-to-back before the rate applies.
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retry_count: u32,

    /// Fixed pause between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

const fn default_buffer_size() -> usize {
    100
}

const fn default_workers() -> usize {
    1
}

const fn default_messages_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    1
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            workers: default_workers(),
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            retry_count: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub const fn with_rate(mut self, messages_per_second: f64) -> Self {
        self.messages_per_second = messages_per_second;
        self
    }

    #[must_use]
    pub const fn with_burst(mut self, burst_size: u32) -> Self {
        self.burst_size = burst_size;
        self
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = retry_delay.as_millis() as u64;
        self
    }

    /// Reasons this configuration cannot drive a queue.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.buffer_size == 0 {
            return Err("buffer_size must be at least 1".to_string());
        }
        if !(self.messages_per_second.is_finite() && self.messages_per_second > 0.0) {
            return Err(format!(
                "messages_per_second must be positive, got {}",
                self.messages_per_second
            ));
        }
        if self.burst_size == 0 {
            return Err("burst_size must be at least 1".to_string());
        }
        Ok(())
    }
}
