//! Retry logic with exponential backoff
//!
//! A [`RetryPolicy`] wraps a whole provider call. Retryable provider errors
//! and schema validation failures are retried; everything else is returned
//! at once.

use crate::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 means no retries)
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Default backoff with a different attempt count (at least one)
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }

    /// Execute an async operation with retry logic
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once every attempt is spent.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Attempt {}/{} for operation: {}", attempt, attempts, operation_name);

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            "Operation '{}' succeeded after {} retries",
                            operation_name,
                            attempt - 1
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!("Operation '{}' failed with non-retryable error", operation_name);
                return Err(error);
            }

            if attempt >= attempts {
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation_name, attempts, error
                );
                return Err(error);
            }

            let backoff = self.backoff_duration(attempt);
            warn!(
                "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                operation_name, attempt, attempts, error, backoff
            );
            sleep(backoff).await;
        }
    }
}

/// `max_retries` counts retries, so the policy makes one more attempt than that
impl From<&promptcall_utils::Config> for RetryPolicy {
    fn from(config: &promptcall_utils::Config) -> Self {
        Self::with_max_attempts(config.max_retries.saturating_add(1))
    }
}
