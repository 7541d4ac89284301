//! Batched instruction text handed to the agent.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::DateTime;

use crate::agents::AgentProfile;
use crate::message::{PendingItem, PendingKind, ReplyTarget};

/// Characters of the agent's spec document included as context.
pub const SPEC_EXCERPT_CHARS: usize = 800;

const DOCS_DIR: &str = "agent-docs";

/// First [`SPEC_EXCERPT_CHARS`] characters of `agent-docs/<spec_file>`, if present.
pub fn load_spec_excerpt(workdir: &Path, profile: &AgentProfile) -> Option<String> {
    let path = workdir.join(DOCS_DIR).join(profile.spec_file);
    let content = fs::read_to_string(path).ok()?;
    let excerpt: String = content.chars().take(SPEC_EXCERPT_CHARS).collect();
    let excerpt = excerpt.trim();
    (!excerpt.is_empty()).then(|| excerpt.to_string())
}

/// Render a bus timestamp (`"1700000000.000100"`) as UTC wall-clock time.
pub fn format_timestamp(ts: &str) -> String {
    ts.split('.')
        .next()
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// The exact command the agent must run to answer `item`.
pub fn reply_command(profile: &AgentProfile, channel: &str, item: &PendingItem) -> String {
    let mut command = format!("herald say --agent {} --channel {}", profile.id, channel);
    if let ReplyTarget::Thread(root) = item.reply_target() {
        let _ = write!(command, " --thread {}", root);
    }
    command.push_str(" \"<your reply>\"");
    command
}

/// Build one instruction covering every pending item.
pub fn build_batch_instruction(
    profile: &AgentProfile,
    channel: &str,
    items: &[PendingItem],
    spec_excerpt: Option<&str>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# You are {} {}", profile.name, profile.emoji);
    out.push('\n');
    out.push_str("## Identity\n");
    let _ = writeln!(out, "- Name: {}", profile.name);
    let _ = writeln!(out, "- Role: {}", profile.role);
    out.push('\n');
    out.push_str("## Brief Context\n");
    out.push_str(spec_excerpt.unwrap_or("You are an AI agent on a development team."));
    out.push_str("\n\n");

    let _ = writeln!(
        out,
        "## Task\nYou have {} Slack message{} to respond to in channel {}. \
         Reply to EVERY item below, each exactly once, using the command given for it.",
        items.len(),
        if items.len() == 1 { "" } else { "s" },
        channel
    );

    for (index, item) in items.iter().enumerate() {
        let kind = match item.kind {
            PendingKind::Mention => "Mention",
            PendingKind::ThreadReply => "Thread reply",
        };
        out.push('\n');
        let _ = writeln!(out, "### {}. {} from {}", index + 1, kind, item.author);
        let _ = writeln!(out, "Time: {}", format_timestamp(&item.timestamp));
        let _ = writeln!(out, "Timestamp: {}", item.timestamp);
        let _ = writeln!(out, "Reply in: {}", item.reply_target());
        let _ = writeln!(out, "Message: {}", item.text);
        let _ = writeln!(out, "Reply with: {}", reply_command(profile, channel, item));
    }

    out.push('\n');
    let _ = write!(
        out,
        "Keep each reply concise (1-3 sentences), friendly and specific to the message. \
         Do not ask for permission or confirmation. Sign off with your emoji {}.",
        profile.emoji
    );
    out
}
