//! Exponential backoff for reconnect attempts.

use std::time::Duration;

pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(30_000);
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: INITIAL_RETRY_DELAY,
            max: MAX_RETRY_DELAY,
            multiplier: BACKOFF_MULTIPLIER,
            max_attempts: None,
        }
    }
}

/// Exponential backoff state shared by reconnect logic.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    policy: BackoffPolicy,
    attempts: u32,
    delay: Duration,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            delay: policy.initial,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
    }

    /// Advance to the next attempt, updating the delay for the subsequent attempt.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    pub fn next_delay_and_advance(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let current = self.delay;
        self.attempts += 1;
        self.delay = self.delay.mul_f64(self.policy.multiplier).min(self.policy.max);
        Some(current)
    }
}
