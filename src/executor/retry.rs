//! Retry policy: classification, backoff, and attempt bookkeeping.
//!
//! Classification is delegated to [`ExecutionError::is_retryable`] (HTTP
//! 429/5xx, timeouts, AI errors the provider marked retryable). Backoff
//! for the exponential strategy is AWS-style "full jitter": a delay drawn
//! uniformly from `[0, min(cap, base·2^attempt))` with a 32 s cap.

use rand::Rng;
use std::time::Duration;

use crate::ast::{Backoff, ErrorConfig};
use crate::errors::ExecutionError;

/// Upper bound on any single backoff delay, in milliseconds.
pub const BACKOFF_CAP_MS: u64 = 32_000;

/// Resolved retry policy for one node.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    pub base_ms: u64,
    pub backoff: Backoff,
    /// Guard expression; when present, retries apply only while it
    /// evaluates truthy against the error.
    pub when: Option<String>,
}

impl RetryPolicy {
    /// Runtime defaults: 3 retries, 1000 ms base, exponential backoff.
    #[must_use]
    pub fn default_policy() -> Self {
        Self {
            max_retries: 3,
            base_ms: 1_000,
            backoff: Backoff::Exponential,
            when: None,
        }
    }

    /// The node's declared policy, falling back to the defaults.
    #[must_use]
    pub fn from_error_config(config: Option<&ErrorConfig>) -> Self {
        match config.and_then(|c| c.retry.as_ref()) {
            Some(retry) => Self {
                max_retries: retry.max,
                base_ms: 1_000,
                backoff: retry.backoff,
                when: retry.when.clone(),
            },
            None => Self::default_policy(),
        }
    }

    /// The delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = match self.backoff {
            Backoff::Fixed => self.base_ms.min(BACKOFF_CAP_MS),
            Backoff::Linear => (self.base_ms.saturating_mul(u64::from(attempt) + 1)).min(BACKOFF_CAP_MS),
            Backoff::Exponential => calculate_backoff_ms(attempt, self.base_ms),
        };
        Duration::from_millis(millis)
    }
}

/// Full-jitter exponential backoff: uniform in
/// `[0, min(32_000, base·2^attempt))`.
#[must_use]
pub fn calculate_backoff_ms(attempt: u32, base_ms: u64) -> u64 {
    let ceiling = base_ms
        .checked_shl(attempt.min(31))
        .unwrap_or(BACKOFF_CAP_MS)
        .min(BACKOFF_CAP_MS);
    if ceiling == 0 {
        return 0;
    }
    rand::rng().random_range(0..ceiling)
}

/// Whether an error is worth another attempt.
#[must_use]
pub fn is_retryable_error(error: &ExecutionError) -> bool {
    error.is_retryable()
}
