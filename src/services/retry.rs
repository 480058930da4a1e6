//! Bounded re-execution of ledger operations that lost a lock race

use std::{future::Future, time::Duration};

use crate::{config::LedgerConfig, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Only `ConcurrencyConflict` is retried; every attempt is a fresh
    /// transaction, so a retry never sees the rolled back state of the last one.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "{} hit a concurrency conflict (attempt {}/{}): {}",
                        name,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl From<&LedgerConfig> for RetryPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_backoff_ms))
    }
}
