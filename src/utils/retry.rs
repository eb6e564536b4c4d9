//! Retry with exponential backoff for library calls.
//!
//! Only transient failures (the service not answering) are retried. Library
//! operations never retry on their own; callers opt in through [`with_retry`].

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::library::LibraryError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `retries` extra attempts on top of the first
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powf(attempt.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, LibraryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LibraryError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after transient failures");
                }
                return Ok(result);
            }
            Err(error) if error.is_transient() && attempt < config.max_attempts => {
                let delay = config.delay_for(attempt);
                tracing::debug!(attempt, ?delay, %error, "transient failure, retrying");
                sleep(delay).await;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(attempts = attempt, %error, "giving up after transient failures");
                }
                return Err(error);
            }
        }
    }
}
