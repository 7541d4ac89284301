//! Slack Web API client for herald.
//!
//! A small typed wrapper over the handful of Web API methods the monitor and
//! the `say` command need:
//! - `auth.test` to verify credentials
//! - `conversations.history` / `conversations.replies` for polling
//! - `users.list` to turn user ids into display names
//! - `chat.postMessage` to post as an agent persona
//!
//! # Configuration
//!
//! Tokens are read from the token file (`/dev/shm/mcp-token`, a
//! `Slack={"bot_token": ..., "access_token": ...}` line) and then from the
//! environment:
//! - `SLACK_BOT_TOKEN` or `SLACK_MCP_XOXB_TOKEN` - bot token (xoxb-...)
//! - `SLACK_TOKEN` or `SLACK_MCP_XOXP_TOKEN` - user token (xoxp-...)
//! - `SLACK_API_BASE_URL` - override of `https://slack.com/api`
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_slack::{SlackClient, SlackConfig};
//!
//! let client = SlackClient::new(SlackConfig::load(None)?)?;
//! let messages = client.conversations_history("C0123", 10).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod types;

pub use client::{ClientOptions, SlackClient};
pub use config::SlackConfig;
pub use error::{SlackApiError, SlackError, SlackResult, mentions_rate_limit};
pub use messages::{SlackMessageContent, markdown_to_mrkdwn};
pub use types::{AuthInfo, HistoryMessage, PostedMessage, SlackUser};
