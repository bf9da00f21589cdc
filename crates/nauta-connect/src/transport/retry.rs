//! Bounded retry policy with deterministic exponential backoff.

use std::time::Duration;

/// How many times a request is retried and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3, so 4 attempts total).
    pub max_retries: u32,
    /// Unit of the backoff curve (default: 1 second).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Same retry count, different backoff unit.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `retry` (1-based): `base_delay * 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(16);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Whether a final HTTP status should be retried.
    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500
    }
}

/// Per-call bookkeeping, discarded once the call resolves.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Attempts made so far, including the first.
    pub attempts: u32,
    /// Time spent sleeping between attempts.
    pub total_delay: Duration,
}

impl RetryContext {
    pub fn retries_done(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn record_backoff(&mut self, delay: Duration) {
        self.total_delay = self.total_delay.saturating_add(delay);
    }
}
