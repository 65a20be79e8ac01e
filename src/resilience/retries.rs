//! Retry policy for backing-store operations.
//!
//! # Design Decisions
//! - `max_attempts` counts the first try, so 3 means "one try, two retries"
//! - Writes default to a single attempt; callers opt in for idempotent ones

use std::time::Duration;

use crate::config::validation::ValidationError;
use crate::resilience::backoff::{calculate_backoff, total_backoff};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Build a policy, rejecting a zero attempt budget.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, ValidationError> {
        if max_attempts == 0 {
            return Err(ValidationError::new(
                "retries.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            ..Self::default()
        })
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay after the failed attempt with 0-based index `retry_index`.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        calculate_backoff(retry_index, self.base_delay, self.max_delay)
    }

    /// Worst-case time spent sleeping when every attempt fails.
    pub fn worst_case_backoff(&self) -> Duration {
        total_backoff(self.max_attempts, self.base_delay, self.max_delay)
    }
}
