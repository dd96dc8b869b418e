//! Retry with exponential backoff for retryable request failures

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use log::warn;

use crate::error::ApiError;

/// Backoff policy of the request layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 means a single attempt)
    pub retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryPolicy {{ retries: {}, base_delay: {:?}, max_delay: {:?} }}",
            self.retries, self.base_delay, self.max_delay
        )
    }
}

impl RetryPolicy {
    /// Same policy with a different retry count
    pub fn with_retries(&self, retries: u32) -> Self {
        Self {
            retries,
            ..self.clone()
        }
    }

    /// Deterministic doubling schedule: `min(base * 2^(n-1), max)`
    pub(crate) fn schedule(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.base_delay,
            current_interval: self.base_delay,
            max_interval: self.max_delay,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        backoff.reset();
        backoff
    }

    /// Delays that would be slept between attempts, in order
    pub fn delays(&self) -> Vec<Duration> {
        let mut schedule = self.schedule();
        (0..self.retries)
            .filter_map(|_| schedule.next_backoff())
            .collect()
    }

    /// Run `operation` until it succeeds, fails terminally or retries run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut schedule = self.schedule();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt <= self.retries => {
                    let Some(delay) = schedule.next_backoff() else {
                        return Err(err);
                    };

                    warn!(
                        "Request failed with retryable error, retrying in {:?} (retry {}/{}): {}",
                        delay, attempt, self.retries, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
