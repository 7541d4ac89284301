//! Error types for the Slack client.
//!
//! Distinguishes rate limiting from other API failures so callers can route
//! it into their backoff handling instead of treating it as a hard error.

use thiserror::Error;

/// Wait assumed when Slack signals rate limiting without a `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Failure of a Slack Web API call.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Missing or unusable credentials/settings.
    #[error("Slack configuration: {0}")]
    Config(String),

    /// Token rejected, revoked or lacking scope.
    #[error("Slack rejected the token: {0}")]
    Auth(String),

    /// `ok: false` or a non-success HTTP status.
    #[error("Slack API call failed: {0}")]
    Api(String),

    /// HTTP 429 or a `ratelimited` error code.
    #[error("Slack rate limit hit, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Cannot reach Slack: {0}")]
    Network(String),

    #[error("Malformed JSON: {0}")]
    Json(String),

    #[error("Slack request timed out: {0}")]
    Timeout(String),

    /// Unknown channel, or the bot is not a member.
    #[error("Channel unavailable: {0}")]
    Channel(String),

    /// A successful response missing the fields we need.
    #[error("Unexpected Slack response: {0}")]
    InvalidPayload(String),

    #[error("Slack client setup failed: {0}")]
    Internal(String),
}

impl SlackError {
    /// Whether this error means the caller hit a rate limit.
    ///
    /// Besides the typed variant, some gateways surface rate limiting only as
    /// free text, so API and network messages are checked as well.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            SlackError::RateLimited { .. } => true,
            SlackError::Api(msg) | SlackError::Network(msg) => mentions_rate_limit(msg),
            _ => false,
        }
    }

    /// Suggested wait from the server, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SlackError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Check free text for a rate-limit indication.
pub fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("ratelimited")
        || lower.contains("rate_limited")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("connect: {}", err))
        } else if err.is_decode() {
            SlackError::InvalidPayload(err.to_string())
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

/// Result type for Slack operations.
pub type SlackResult<T> = std::result::Result<T, SlackError>;

/// An `ok: false` response from the Web API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackApiError {
    /// API method, e.g. `conversations.history`.
    pub method: String,
    /// Slack error code, e.g. `not_in_channel`.
    pub code: String,
}

impl SlackApiError {
    pub fn new(method: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            code: code.into(),
        }
    }

    fn describe(&self) -> String {
        format!("{} returned {}", self.method, self.code)
    }
}

impl From<SlackApiError> for SlackError {
    fn from(err: SlackApiError) -> Self {
        match err.code.as_str() {
            "ratelimited" | "rate_limited" => SlackError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            },
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
            | "missing_scope" => SlackError::Auth(err.describe()),
            "channel_not_found" | "not_in_channel" | "thread_not_found" | "is_archived" => {
                SlackError::Channel(err.describe())
            }
            _ => SlackError::Api(err.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message() {
        let err = SlackError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Slack rate limit hit, retry in 60s");
        assert_eq!(err.retry_after_secs(), Some(60));
    }

    #[test]
    fn test_api_error_codes_map_to_variants() {
        let err: SlackError = SlackApiError::new("auth.test", "invalid_auth").into();
        assert!(matches!(err, SlackError::Auth(_)));
        assert_eq!(err.to_string(), "Slack rejected the token: auth.test returned invalid_auth");

        let err: SlackError = SlackApiError::new("conversations.history", "not_in_channel").into();
        assert!(matches!(err, SlackError::Channel(_)));

        let err: SlackError = SlackApiError::new("conversations.history", "ratelimited").into();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after_secs(), Some(DEFAULT_RETRY_AFTER_SECS));

        let err: SlackError = SlackApiError::new("chat.postMessage", "msg_too_long").into();
        assert!(matches!(err, SlackError::Api(_)));
        assert_eq!(err.retry_after_secs(), None);
    }

    #[test]
    fn test_rate_limit_detected_in_text() {
        assert!(SlackError::Api("429 Too Many Requests".to_string()).is_rate_limited());
        assert!(SlackError::Network("rate limit exceeded".to_string()).is_rate_limited());
        assert!(!SlackError::Api("channel_not_found".to_string()).is_rate_limited());
        assert!(!SlackError::Timeout("rate limit".to_string()).is_rate_limited());
    }
}
