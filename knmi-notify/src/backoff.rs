//! Reconnect delay policy.

use std::time::Duration;

use crate::error::ConfigError;

/// How long to wait before reconnecting after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The same delay after every failure
    Fixed {
        /// Delay between attempts
        delay: Duration,
    },
    /// Delay multiplied after each consecutive failure, up to a cap
    Exponential {
        /// Delay after the first failure
        initial: Duration,
        /// Upper bound for the delay
        max: Duration,
        /// Growth factor per consecutive failure
        multiplier: u32,
    },
}

impl RetryPolicy {
    /// A constant delay after every failure.
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy::Fixed { delay }
    }

    /// A doubling delay from `initial` up to `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        RetryPolicy::Exponential {
            initial,
            max,
            multiplier: 2,
        }
    }

    /// Check the policy for values that would spin or never retry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            RetryPolicy::Fixed { delay } => {
                if delay.is_zero() {
                    return Err(ConfigError::Invalid(
                        "Fixed retry delay must be greater than 0".to_string(),
                    ));
                }
            }
            RetryPolicy::Exponential {
                initial,
                max,
                multiplier,
            } => {
                if initial.is_zero() {
                    return Err(ConfigError::Invalid(
                        "Initial retry delay must be greater than 0".to_string(),
                    ));
                }
                if initial > max {
                    return Err(ConfigError::Invalid(
                        "Initial retry delay must not exceed the maximum".to_string(),
                    ));
                }
                if multiplier == 0 {
                    return Err(ConfigError::Invalid(
                        "Retry multiplier must be at least 1".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(30), Duration::from_secs(15 * 60))
    }
}

/// Consecutive-failure state for a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    /// Start with no recorded failures.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt.
    ///
    /// `likely_permanent` failures (a rejected credential) go straight to the
    /// cap under the exponential policy. They are still retried.
    pub fn next_delay(&mut self, likely_permanent: bool) -> Duration {
        self.failures = self.failures.saturating_add(1);

        match self.policy {
            RetryPolicy::Fixed { delay } => delay,
            RetryPolicy::Exponential { max, .. } if likely_permanent => max,
            RetryPolicy::Exponential {
                initial,
                max,
                multiplier,
            } => multiplier
                .checked_pow(self.failures - 1)
                .and_then(|factor| initial.checked_mul(factor))
                .map_or(max, |delay| delay.min(max)),
        }
    }

    /// Forget recorded failures after a successful connection.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Number of consecutive failures recorded.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// The policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
