//! Wire types for the Web API methods the client uses.

use serde::{Deserialize, Serialize};

/// A message as returned by `conversations.history` / `conversations.replies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Message timestamp; unique per channel.
    pub ts: String,
    /// Posting user id (absent for some bot messages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Message text.
    #[serde(default)]
    pub text: String,
    /// Parent timestamp when the message belongs to a thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Number of replies (thread parents only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u32>,
    /// Timestamp of the newest reply (thread parents only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_reply: Option<String>,
    /// Bot id, set for bot-posted messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    /// Custom username of a bot-posted message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Message subtype (e.g. "bot_message", "channel_join").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl HistoryMessage {
    /// Check if this message was posted by a bot.
    pub fn is_bot_message(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Check if this is a reply inside a thread (not the parent).
    pub fn is_thread_reply(&self) -> bool {
        self.thread_ts.as_deref().is_some_and(|root| root != self.ts)
    }

    /// Check if this message has thread replies.
    pub fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0
    }

    /// Custom username to attribute the message to, if it carries one.
    pub fn custom_username(&self) -> Option<&str> {
        if self.is_bot_message() {
            self.username.as_deref().filter(|name| !name.is_empty())
        } else {
            None
        }
    }
}

/// A workspace member from `users.list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl SlackUser {
    /// Best human-readable name: real name, then handle, then id.
    pub fn display_name(&self) -> &str {
        self.real_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(&self.id)
    }
}

/// Identity returned by `auth.test`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// Result of `chat.postMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}
