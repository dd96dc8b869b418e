//! Retry policy and result envelope

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryStrategy;

/// Attempt and backoff policy for one orchestration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Primary attempts, at least one
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    pub delay_ms: u64,

    /// Double the delay after every failed attempt
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            exponential_backoff: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay_ms: u64, exponential_backoff: bool) -> Self {
        Self {
            max_attempts,
            delay_ms,
            exponential_backoff,
        }
        .normalized()
    }

    /// Same policy with `max_attempts` clamped to at least one
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self
    }

    /// Delay to wait after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return Duration::from_millis(self.delay_ms);
        }

        let exponent = attempt.saturating_sub(1).min(31);
        Duration::from_millis(self.delay_ms.saturating_mul(1u64 << exponent))
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_attempts: {}, delay_ms: {}, exponential_backoff: {} }}",
            self.max_attempts, self.delay_ms, self.exponential_backoff
        )
    }
}

/// Uniform outcome of an orchestration call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult<T> {
    pub success: bool,

    /// Present iff `success`
    pub data: Option<T>,

    /// Present iff not `success`
    pub error: Option<String>,

    /// Provider calls actually made, including the fallback call
    pub attempts: u32,

    /// Last raw completion received; `None` if no call returned text
    pub raw_response: Option<String>,

    /// Strategy that recovered `data`
    pub strategy: Option<RecoveryStrategy>,
}

impl<T> ProcessingResult<T> {
    pub(crate) fn succeeded(
        data: T,
        attempts: u32,
        raw_response: String,
        strategy: RecoveryStrategy,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            attempts,
            raw_response: Some(raw_response),
            strategy: Some(strategy),
        }
    }

    pub(crate) fn failed(error: String, attempts: u32, raw_response: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            attempts,
            raw_response,
            strategy: None,
        }
    }

    /// Collapse into a `Result`, dropping the diagnostics
    pub fn into_result(self) -> Result<T, String> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(self.error.unwrap_or_else(|| "Unknown error".to_string())),
        }
    }
}
