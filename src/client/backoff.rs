//! Reconnect delay policy.
//!
//! The delay before reconnect attempt `k` (1-based) is `base × 2^(k-1)`,
//! clamped to `max_delay`. Equivalently, after `n` consecutive failures the
//! next wait is [`ReconnectPolicy::delay_for`]`(n)`. The delay is a pure
//! function of the attempt number so it can be checked without a clock.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// `base × 2^failures`, clamped to `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Attempt counter driven by the reconnection manager.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Claim the next attempt. Returns its 1-based number and the delay to
    /// wait before making it, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        Some((self.attempt, delay))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
