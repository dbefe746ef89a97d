//! Dial retry policy with exponential backoff.
//!
//! The connect control loop treats every dial failure as retryable and asks
//! this policy how long to sleep before the next attempt. With default
//! options the backoff cap equals the base interval, so attempts are evenly
//! spaced; raising `retry_ivl_max` turns on doubling backoff.

use std::time::Duration;

use tracing::trace;

use crate::options::SocketOptions;

/// Tracks dial attempts and computes backoff delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_interval: Duration,
    max_interval: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
    current_interval: Duration,
}

impl RetryPolicy {
    /// Build a policy from socket options.
    pub const fn new(options: &SocketOptions) -> Self {
        Self {
            base_interval: options.retry_ivl,
            max_interval: options.retry_ivl_max,
            max_attempts: options.max_retry_attempts,
            attempt: 0,
            current_interval: options.retry_ivl,
        }
    }

    /// Delay to sleep before the next dial attempt.
    ///
    /// Doubles per attempt up to the configured cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;

        self.attempt += 1;
        self.current_interval = self.base_interval * (1_u32 << self.attempt.min(10));
        if self.current_interval > self.max_interval {
            self.current_interval = self.max_interval;
        }

        trace!(attempt = self.attempt, ?delay, "dial backoff");
        delay
    }

    /// True once the configured attempt budget is spent.
    ///
    /// Always false for the default unbounded policy.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.attempt >= max,
            None => false,
        }
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.base_interval;
    }

    /// Number of attempts made since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
