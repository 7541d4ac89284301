//! Tunables for the dispatcher loop.

use std::path::PathBuf;
use std::time::Duration;

use herald_ratelimits::BackoffPolicy;

use crate::error::{MonitorError, MonitorResult};

/// Configuration for dispatcher behavior.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Base wait between poll cycles.
    pub poll_interval: Duration,
    /// Upper bound of the uniform random jitter added to each wait.
    pub poll_jitter: Duration,
    /// Messages requested per main-channel fetch.
    pub message_limit: u32,
    /// Raw top-level messages scanned for thread activity.
    pub raw_message_limit: u32,
    /// Replies requested per thread fetch.
    pub thread_reply_limit: u32,
    /// Threads whose replies are fetched in one cycle.
    pub max_threads_per_cycle: usize,
    /// Cap on the wait after a rate-limited main fetch.
    pub max_rate_limit_sleep: Duration,
    /// Backoff applied to rate-limit signals.
    pub backoff: BackoffPolicy,
    /// Timeout for each bus call.
    pub bus_timeout: Duration,
    /// Timeout for the batched agent invocation.
    pub agent_timeout: Duration,
    /// Wall-clock limit for the whole run; `None` runs until interrupted.
    pub max_runtime: Option<Duration>,
    /// Entries kept in the seen-messages set.
    pub seen_messages_cap: usize,
    /// Entries kept in the seen-replies set.
    pub seen_replies_cap: usize,
    /// Entries kept in the agent thread registry.
    pub agent_threads_cap: usize,
    /// Directory holding the state and lock files.
    pub state_dir: PathBuf,
    /// Working directory for the agent process (also where `agent-docs/` lives).
    pub workdir: PathBuf,
    /// Agent executable.
    pub agent_command: String,
    /// Arguments placed before the instruction text.
    pub agent_args: Vec<String>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(45),
            poll_jitter: Duration::from_secs(5),
            message_limit: 10,
            raw_message_limit: 20,
            thread_reply_limit: 20,
            max_threads_per_cycle: 3,
            max_rate_limit_sleep: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            bus_timeout: Duration::from_secs(30),
            agent_timeout: Duration::from_secs(180),
            max_runtime: Some(Duration::from_secs(8 * 60 * 60)),
            seen_messages_cap: 100,
            seen_replies_cap: 100,
            agent_threads_cap: 20,
            state_dir: PathBuf::from("."),
            workdir: PathBuf::from("."),
            agent_command: "claude".to_string(),
            agent_args: vec!["-p".to_string()],
        }
    }
}

impl MonitorOptions {
    /// Reject settings that would make the loop misbehave.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.poll_interval.is_zero() {
            return Err(MonitorError::Config(
                "Poll interval must be at least one second".to_string(),
            ));
        }
        if self.message_limit == 0 {
            return Err(MonitorError::Config(
                "Message limit must be positive".to_string(),
            ));
        }
        if self.seen_messages_cap == 0 || self.seen_replies_cap == 0 {
            return Err(MonitorError::Config(
                "Seen-set capacities must be positive".to_string(),
            ));
        }
        if self.agent_command.trim().is_empty() {
            return Err(MonitorError::Config("Agent command is empty".to_string()));
        }
        if self.backoff.initial_secs == 0 || self.backoff.max_secs == 0 {
            return Err(MonitorError::Config(
                "Backoff durations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MonitorOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(45));
        assert_eq!(options.message_limit, 10);
        assert_eq!(options.raw_message_limit, 20);
        assert_eq!(options.max_threads_per_cycle, 3);
        assert_eq!(options.agent_timeout, Duration::from_secs(180));
        assert_eq!(options.seen_messages_cap, 100);
        assert_eq!(options.agent_threads_cap, 20);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let options = MonitorOptions {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let options = MonitorOptions {
            agent_command: "  ".to_string(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
