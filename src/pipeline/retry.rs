// ============================================================================
// Subscriber Retry Policy
// Capped exponential backoff applied when a subscriber fails an event
// ============================================================================

use crate::domain::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a bus worker waits before handing a failed event back to its
/// subscriber. Retries never give up: a subscriber that keeps failing stalls
/// its channel, which backs up into the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: u32,

    /// Consecutive failures after which retries are logged at `error`
    pub escalate_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
            escalate_after: 5,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay, for tests and in-memory subscribers
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);

        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn should_escalate(&self, attempt: u32) -> bool {
        attempt >= self.escalate_after
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::InvalidRetryPolicy(
                "initial backoff exceeds max backoff",
            ));
        }
        if self.multiplier == 0 {
            return Err(ConfigError::InvalidRetryPolicy("multiplier must be positive"));
        }
        if self.escalate_after == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "escalate_after must be positive",
            ));
        }
        Ok(())
    }
}
