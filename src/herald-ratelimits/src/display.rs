//! Backoff status formatting for log lines.

use std::time::Duration;

use crate::RateLimitHandler;

/// Render the handler state as a short human-readable string.
pub fn format_backoff_status(handler: &RateLimitHandler) -> String {
    if handler.consecutive_failures() == 0 {
        return "healthy".to_string();
    }

    let failures = handler.consecutive_failures();
    format!(
        "backing off {}, {} consecutive failure{}, {} remaining",
        format_secs(handler.current_backoff()),
        failures,
        if failures == 1 { "" } else { "s" },
        format_secs(handler.remaining_backoff())
    )
}

/// Format a duration as whole seconds, with minutes above one minute.
pub fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(Duration::from_secs(5)), "5s");
        assert_eq!(format_secs(Duration::from_secs(60)), "1m00s");
        assert_eq!(format_secs(Duration::from_secs(605)), "10m05s");
    }

    #[test]
    fn test_status_healthy() {
        let handler = RateLimitHandler::default();
        assert_eq!(format_backoff_status(&handler), "healthy");
    }

    #[test]
    fn test_status_backing_off() {
        let mut handler = RateLimitHandler::default();
        handler.on_failure();
        handler.on_failure();

        let status = format_backoff_status(&handler);
        assert!(status.starts_with("backing off 2m00s"));
        assert!(status.contains("2 consecutive failures"));
    }
}
