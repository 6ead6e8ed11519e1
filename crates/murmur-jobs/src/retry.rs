//! Retry policies for scheduled jobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// No retry.
    None,
    /// Fixed delay between retries.
    Fixed,
    /// Delay doubles (by `multiplier`) after every retry.
    Exponential,
}

/// How many times a failed run is retried and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry strategy.
    pub strategy: RetryStrategy,

    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,

    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff multiplier for exponential retries.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Creates a policy with no retries.
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_retries: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Creates a fixed delay retry policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        let delay_ms = duration_ms(delay);
        Self {
            strategy: if max_retries == 0 {
                RetryStrategy::None
            } else {
                RetryStrategy::Fixed
            },
            max_retries,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
        }
    }

    /// Creates an exponential backoff policy starting at `initial_delay`.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_retries,
            initial_delay_ms: duration_ms(initial_delay),
            max_delay_ms: 3_600_000, // 1 hour
            multiplier: 2.0,
        }
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Total attempts per run, the first one included.
    pub fn max_attempts(&self) -> u32 {
        match self.strategy {
            RetryStrategy::None => 1,
            _ => self.max_retries.saturating_add(1),
        }
    }

    /// Returns true if retry number `attempt` (1-based) is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.strategy != RetryStrategy::None && attempt <= self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            RetryStrategy::None => 0,
            RetryStrategy::Fixed => self.initial_delay_ms,
            RetryStrategy::Exponential => {
                let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exp);
                if delay >= self.max_delay_ms as f64 {
                    self.max_delay_ms
                } else {
                    delay as u64
                }
            }
        };

        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
