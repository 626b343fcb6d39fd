//! Aggregate send-rate limiting using the token bucket algorithm.
//!
//! One bucket is shared by every queue worker, so the configured rate is the
//! total throughput regardless of how many workers run.
//!
//! - Tokens are added to the bucket at a constant rate (`refill_rate`)
//! - Each message consumes one token
//! - If no tokens are available, the worker waits
//! - The bucket holds at most `burst_size` tokens
//!
//! ```text
//! Rate limit: 2 msg/sec, burst: 1
//! - First message goes immediately
//! - Each later message waits for the next token, 500ms apart
//! ```

use std::time::{Duration, Instant};

use herald_common::internal;
use parking_lot::Mutex;

/// Token bucket state.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,
    /// Maximum tokens (burst size)
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

impl TokenBucket {
    fn new(messages_per_second: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_rate: messages_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token, or reports how long until one is available. Waits too
    /// long to represent saturate at [`Duration::MAX`].
    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::try_from_secs_f64(tokens_needed / self.refill_rate)
                .unwrap_or(Duration::MAX))
        }
    }
}

/// Shared rate limiter for a send queue.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// `messages_per_second` must be positive and finite; queue construction
    /// validates this.
    #[must_use]
    pub fn new(messages_per_second: f64, burst_size: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(messages_per_second, burst_size)),
        }
    }

    /// Takes a token if one is available.
    ///
    /// # Errors
    ///
    /// Returns how long to wait before a token will be available.
    pub fn check(&self) -> Result<(), Duration> {
        self.bucket.lock().try_consume()
    }

    /// Waits until a token is available and takes it.
    pub async fn until_ready(&self) {
        loop {
            match self.check() {
                Ok(()) => return,
                Err(wait) => {
                    internal!(
                        wait_seconds = wait.as_secs_f64(),
                        "Rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
