//! Retry policy for transient exchange failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::types::ExchangeError;

/// Retries an operation a fixed number of times with a constant delay.
/// Only transient errors (network, rate limit, 5xx) are retried;
/// everything else is returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Standard policy for exchange requests: 3 attempts, 2s apart.
    pub fn transient() -> Self {
        Self::new(3, Duration::from_secs(2))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
