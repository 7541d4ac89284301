//! Outgoing message content and formatting.
//!
//! Provides:
//! - [`SlackMessageContent`], the payload for `chat.postMessage`
//! - Markdown to mrkdwn conversion for agent-written text

use serde::{Deserialize, Serialize};

/// Slack's hard limit on message text length.
pub const MAX_MESSAGE_CHARS: usize = 40_000;

/// Content of a message to post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackMessageContent {
    /// Message text (mrkdwn).
    pub text: String,
    /// Thread timestamp (for replies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Custom display name (bot tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Custom avatar URL (bot tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Custom avatar emoji, used when no URL is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
}

impl SlackMessageContent {
    /// Create content with the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Post as a reply in the given thread.
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Post under a custom persona.
    pub fn as_persona(mut self, username: impl Into<String>, icon_url: Option<String>) -> Self {
        self.username = Some(username.into());
        self.icon_url = icon_url;
        self
    }

    /// Set an emoji avatar.
    pub fn with_icon_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.icon_emoji = Some(emoji.into());
        self
    }

    /// JSON body for `chat.postMessage`.
    pub fn to_payload(&self, channel: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "channel": channel,
            "text": truncate_chars(&self.text, MAX_MESSAGE_CHARS),
        });
        if let Some(thread_ts) = &self.thread_ts {
            payload["thread_ts"] = serde_json::json!(thread_ts);
        }
        if let Some(username) = &self.username {
            payload["username"] = serde_json::json!(username);
        }
        if let Some(icon_url) = &self.icon_url {
            payload["icon_url"] = serde_json::json!(icon_url);
        } else if let Some(icon_emoji) = &self.icon_emoji {
            payload["icon_emoji"] = serde_json::json!(icon_emoji);
        }
        payload
    }
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Convert Markdown to Slack mrkdwn.
///
/// - Bold: `**text**` becomes `*text*`
/// - Strikethrough: `~~text~~` becomes `~text~`
/// - Links: `[text](url)` becomes `<url|text>`
/// - Headings: `# Title` becomes `*Title*`
///
/// Code spans and fenced blocks are copied untouched.
pub fn markdown_to_mrkdwn(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut in_fence = false;

    for (idx, line) in md.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line);
            continue;
        }
        if in_fence {
            out.push_str(line);
            continue;
        }
        let heading = line.trim_start_matches('#');
        if heading.len() < line.len() && heading.starts_with(' ') && !heading.trim().is_empty() {
            out.push('*');
            out.push_str(&convert_inline(heading.trim()));
            out.push('*');
        } else {
            out.push_str(&convert_inline(line));
        }
    }

    out
}

fn convert_inline(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        let rest = &chars[i..];

        if rest[0] == '`'
            && let Some(end) = find_seq(&rest[1..], &['`'])
        {
            out.extend(&rest[..end + 2]);
            i += end + 2;
            continue;
        }

        if rest.starts_with(&['*', '*'])
            && let Some(end) = find_seq(&rest[2..], &['*', '*'])
        {
            out.push('*');
            out.extend(&rest[2..end + 2]);
            out.push('*');
            i += end + 4;
            continue;
        }

        if rest.starts_with(&['~', '~'])
            && let Some(end) = find_seq(&rest[2..], &['~', '~'])
        {
            out.push('~');
            out.extend(&rest[2..end + 2]);
            out.push('~');
            i += end + 4;
            continue;
        }

        if rest[0] == '['
            && let Some(close) = find_seq(rest, &[']', '('])
            && let Some(url_len) = find_seq(&rest[close + 2..], &[')'])
        {
            let text: String = rest[1..close].iter().collect();
            let url: String = rest[close + 2..close + 2 + url_len].iter().collect();
            out.push_str(&format!("<{}|{}>", url, text));
            i += close + 2 + url_len + 1;
            continue;
        }

        out.push(rest[0]);
        i += 1;
    }

    out
}

fn find_seq(haystack: &[char], needle: &[char]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_to_mrkdwn_bold() {
        assert_eq!(markdown_to_mrkdwn("**bold** text"), "*bold* text");
    }

    #[test]
    fn test_markdown_to_mrkdwn_link_and_strike() {
        assert_eq!(
            markdown_to_mrkdwn("~~old~~ see [docs](https://example.com)"),
            "~old~ see <https://example.com|docs>"
        );
    }

    #[test]
    fn test_markdown_to_mrkdwn_heading() {
        assert_eq!(markdown_to_mrkdwn("## Status\nok"), "*Status*\nok");
    }

    #[test]
    fn test_markdown_to_mrkdwn_code_preserved() {
        let md = "use `**bold**` here\n```\n**raw**\n```";
        let mrkdwn = markdown_to_mrkdwn(md);
        assert!(mrkdwn.contains("`**bold**`"));
        assert!(mrkdwn.contains("\n**raw**\n"));
    }

    #[test]
    fn test_markdown_to_mrkdwn_non_ascii() {
        assert_eq!(markdown_to_mrkdwn("🌟 **Nova** ✅"), "🌟 *Nova* ✅");
    }

    #[test]
    fn test_payload_thread_and_persona() {
        let payload = SlackMessageContent::new("Reply")
            .in_thread("1234567890.123456")
            .as_persona("Nova", Some("https://img/nova.png".to_string()))
            .with_icon_emoji(":star:")
            .to_payload("C1");

        assert_eq!(payload["channel"], "C1");
        assert_eq!(payload["thread_ts"], "1234567890.123456");
        assert_eq!(payload["username"], "Nova");
        assert_eq!(payload["icon_url"], "https://img/nova.png");
        assert!(payload.get("icon_emoji").is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 6), "abc...");
    }
}
