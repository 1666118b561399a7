// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry and backoff policy for transmissions.
//!
//! [`RetryConfig`] describes a bounded exponential backoff: after the first
//! failed attempt the transmitter waits `initial_delay`, then doubles the
//! wait for each further retry, never exceeding `max_delay`.
//!
//! # Example
//!
//! ```rust
//! use pos_replication::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! let retry = RetryConfig::default();
//! assert_eq!(retry.max_attempts(), 4);
//! assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(4));
//! ```

use std::time::Duration;

/// Configuration for transmission retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Ceiling for exponential backoff.
    pub max_delay: Duration,

    /// Backoff multiplier (2.0 = double each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    /// Three retries waiting 1s, 2s, 4s.
    ///
    /// ```text
    /// Attempt  Wait before  Cumulative
    /// -------  -----------  ----------
    /// 1        -            0s
    /// 2        1s           1s
    /// 3        2s           3s
    /// 4        4s           7s
    /// ```
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast retries for tests.
    pub fn testing() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// No retries at all: one attempt, then give up.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound on attempts for one batch.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay before retry `n` (1-indexed).
    ///
    /// `initial_delay * backoff_factor^(n-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_secs_f64(delay_secs), self.max_delay)
    }

    /// Sum of every backoff wait when all attempts fail.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|n| self.delay_for_attempt(n))
            .sum()
    }
}
