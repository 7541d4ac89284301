//! Rate limit tracking.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{BackoffPolicy, RateLimitState};

/// Central exponential-backoff tracker.
///
/// Every bus call consults [`is_backing_off`](Self::is_backing_off) before it
/// runs and reports its outcome through [`on_success`](Self::on_success) or
/// [`on_failure`](Self::on_failure). The state is global to the process
/// because the rate limit it models is shared by all call sites.
#[derive(Debug, Clone)]
pub struct RateLimitHandler {
    policy: BackoffPolicy,
    state: RateLimitState,
}

impl RateLimitHandler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: RateLimitState::default(),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    /// Failures recorded since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }

    /// Active backoff (zero when healthy).
    pub fn current_backoff(&self) -> Duration {
        self.state.current_backoff
    }

    /// Record a rate-limit signal and return the new backoff.
    pub fn on_failure(&mut self) -> Duration {
        self.on_failure_at(Instant::now())
    }

    /// Record a rate-limit signal observed at `now`.
    pub fn on_failure_at(&mut self, now: Instant) -> Duration {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.state.current_backoff = self.policy.next_backoff(self.state.current_backoff);
        self.state.last_failure = Some(now);

        warn!(
            consecutive_failures = self.state.consecutive_failures,
            backoff_secs = self.state.current_backoff.as_secs(),
            "Rate limited, backing off"
        );

        self.state.current_backoff
    }

    /// Record a successful call, clearing any backoff.
    ///
    /// The time of the last failure is kept so callers can still slow down
    /// after a recent incident (see [`failed_within`](Self::failed_within)).
    pub fn on_success(&mut self) {
        if self.state.consecutive_failures > 0 {
            info!(
                failures = self.state.consecutive_failures,
                "Recovered from rate limiting"
            );
        }
        self.state.consecutive_failures = 0;
        self.state.current_backoff = Duration::ZERO;
    }

    /// Whether the backoff window is still open.
    pub fn is_backing_off(&self) -> bool {
        self.is_backing_off_at(Instant::now())
    }

    pub fn is_backing_off_at(&self, now: Instant) -> bool {
        !self.remaining_backoff_at(now).is_zero()
    }

    /// Time left in the current backoff window, zero if not backing off.
    pub fn remaining_backoff(&self) -> Duration {
        self.remaining_backoff_at(Instant::now())
    }

    pub fn remaining_backoff_at(&self, now: Instant) -> Duration {
        if self.state.current_backoff.is_zero() {
            return Duration::ZERO;
        }
        match self.state.last_failure {
            Some(last) => self
                .state
                .current_backoff
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Whether a failure was recorded within `window` of now.
    pub fn failed_within(&self, window: Duration) -> bool {
        self.failed_within_at(window, Instant::now())
    }

    pub fn failed_within_at(&self, window: Duration, now: Instant) -> bool {
        self.state
            .last_failure
            .is_some_and(|last| now.saturating_duration_since(last) < window)
    }
}

impl Default for RateLimitHandler {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_grow_then_clamp() {
        let mut handler = RateLimitHandler::new(BackoffPolicy::new(60, 2, 600));
        let now = Instant::now();

        let backoffs: Vec<u64> = (0..5)
            .map(|_| handler.on_failure_at(now).as_secs())
            .collect();

        assert_eq!(backoffs, vec![60, 120, 240, 480, 600]);
        assert_eq!(handler.consecutive_failures(), 5);
    }

    #[test]
    fn test_success_resets() {
        let mut handler = RateLimitHandler::default();
        handler.on_failure();
        handler.on_failure();

        handler.on_success();

        assert_eq!(handler.consecutive_failures(), 0);
        assert_eq!(handler.current_backoff(), Duration::ZERO);
        assert!(!handler.is_backing_off());
        assert_eq!(handler.remaining_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_after_reset_starts_at_initial() {
        let mut handler = RateLimitHandler::default();
        handler.on_failure();
        handler.on_failure();
        handler.on_success();

        assert_eq!(handler.on_failure(), Duration::from_secs(60));
    }

    #[test]
    fn test_backing_off_window() {
        let mut handler = RateLimitHandler::default();
        let start = Instant::now();
        handler.on_failure_at(start);

        assert!(handler.is_backing_off_at(start + Duration::from_secs(10)));
        assert_eq!(
            handler.remaining_backoff_at(start + Duration::from_secs(10)),
            Duration::from_secs(50)
        );

        let later = start + Duration::from_secs(61);
        assert!(!handler.is_backing_off_at(later));
        assert_eq!(handler.remaining_backoff_at(later), Duration::ZERO);
    }

    #[test]
    fn test_healthy_handler_never_backs_off() {
        let handler = RateLimitHandler::default();
        assert!(!handler.is_backing_off());
        assert!(!handler.failed_within(Duration::from_secs(600)));
    }

    #[test]
    fn test_recent_failure_survives_success() {
        let mut handler = RateLimitHandler::default();
        let start = Instant::now();
        handler.on_failure_at(start);
        handler.on_success();

        let window = Duration::from_secs(600);
        assert!(handler.failed_within_at(window, start + Duration::from_secs(30)));
        assert!(!handler.failed_within_at(window, start + Duration::from_secs(601)));
    }
}
