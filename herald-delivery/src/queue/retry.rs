//! Fixed-delay retry.

use std::{fmt::Display, time::Duration};

use herald_common::internal;

/// Retry up to `retries` more times after a failure, sleeping `delay` between
/// attempts. No backoff growth, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Runs `attempt` (given the 1-based attempt number) until it succeeds or
    /// the budget is spent. Returns the last outcome and the number of
    /// attempts made.
    pub async fn run<T, E, F, Fut>(&self, mut attempt: F) -> (Result<T, E>, u32)
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return (Ok(value), number),
                Err(err) if number < self.max_attempts() => {
                    internal!(
                        level = DEBUG,
                        attempt = number,
                        "Attempt failed, retrying in {:?}: {err}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    number += 1;
                }
                Err(err) => return (Err(err), number),
            }
        }
    }
}
