//! Backoff policy and rate-limit state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Backoff applied after the first failure, in seconds.
    pub initial_secs: u64,
    /// Growth factor applied on every further consecutive failure.
    pub multiplier: u32,
    /// Upper bound for the backoff, in seconds.
    pub max_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_secs: 60,
            multiplier: 2,
            max_secs: 600,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from explicit values.
    pub fn new(initial_secs: u64, multiplier: u32, max_secs: u64) -> Self {
        Self {
            initial_secs,
            multiplier,
            max_secs,
        }
    }

    /// Initial backoff as a duration (never above the maximum).
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs.min(self.max_secs))
    }

    /// Maximum backoff as a duration.
    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    /// Compute the backoff that follows `current`.
    ///
    /// A zero `current` means the handler was healthy, so the initial backoff
    /// applies. Otherwise the current value grows by the multiplier, clamped
    /// at the maximum.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        if current.is_zero() {
            return self.initial();
        }
        current
            .checked_mul(self.multiplier.max(1))
            .unwrap_or(Duration::MAX)
            .min(self.max())
    }
}

/// Process-lifetime rate-limit state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Active backoff; zero when healthy.
    pub current_backoff: Duration,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the most recent failure was recorded.
    pub last_failure: Option<Instant>,
}

impl RateLimitState {
    /// Whether no backoff is in effect.
    pub fn is_healthy(&self) -> bool {
        self.current_backoff.is_zero() && self.consecutive_failures == 0
    }
}
