//! Messages fetched from the bus and items selected for a response.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A message fetched from the bus. Never mutated by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Display identity of the poster.
    pub author: String,
    pub text: String,
    /// Bus timestamp; unique per channel and used as the message id.
    pub timestamp: String,
    /// Parent timestamp for thread replies.
    pub thread_root: Option<String>,
    /// Reply count (top-level messages with replies only).
    pub reply_count: Option<u32>,
    /// Timestamp of the newest reply (top-level messages with replies only).
    pub latest_reply: Option<String>,
}

impl Message {
    pub fn new(
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: timestamp.into(),
            ..Default::default()
        }
    }

    /// Attach thread activity, as the raw fetch reports it.
    pub fn with_replies(mut self, reply_count: u32, latest_reply: impl Into<String>) -> Self {
        self.reply_count = Some(reply_count);
        self.latest_reply = Some(latest_reply.into());
        self
    }

    /// Mark as a reply inside `thread_root`.
    pub fn in_thread(mut self, thread_root: impl Into<String>) -> Self {
        self.thread_root = Some(thread_root.into());
        self
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0
    }
}

/// Why an item was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// Top-level message naming the agent.
    Mention,
    /// Reply in a thread the agent owns or that names the agent.
    ThreadReply,
}

/// Where the agent must post its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget<'a> {
    MainChannel,
    Thread(&'a str),
}

impl fmt::Display for ReplyTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyTarget::MainChannel => f.write_str("main channel"),
            ReplyTarget::Thread(root) => write!(f, "thread {}", root),
        }
    }
}

/// A message selected for response in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub author: String,
    pub text: String,
    pub timestamp: String,
    /// `None` replies in the main channel, `Some` replies in that thread.
    pub thread_root: Option<String>,
    pub kind: PendingKind,
}

impl PendingItem {
    pub fn mention(message: &Message) -> Self {
        Self {
            author: message.author.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp.clone(),
            thread_root: None,
            kind: PendingKind::Mention,
        }
    }

    pub fn thread_reply(message: &Message, thread_root: &str) -> Self {
        Self {
            author: message.author.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp.clone(),
            thread_root: Some(thread_root.to_string()),
            kind: PendingKind::ThreadReply,
        }
    }

    pub fn reply_target(&self) -> ReplyTarget<'_> {
        match &self.thread_root {
            Some(root) => ReplyTarget::Thread(root),
            None => ReplyTarget::MainChannel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention_targets_main_channel() {
        let msg = Message::new("Arash", "hi nova", "100.1");
        let item = PendingItem::mention(&msg);
        assert_eq!(item.kind, PendingKind::Mention);
        assert_eq!(item.reply_target(), ReplyTarget::MainChannel);
    }

    #[test]
    fn test_thread_reply_targets_thread() {
        let msg = Message::new("Arash", "thanks", "100.2").in_thread("100.1");
        let item = PendingItem::thread_reply(&msg, "100.1");
        assert_eq!(item.reply_target(), ReplyTarget::Thread("100.1"));
        assert_eq!(item.reply_target().to_string(), "thread 100.1");
    }

    #[test]
    fn test_has_replies() {
        assert!(!Message::new("a", "b", "1.0").has_replies());
        assert!(Message::new("a", "b", "1.0").with_replies(2, "1.2").has_replies());
    }
}
