//! Agent identity registry.
//!
//! The set of personas a monitor can run as is closed and known at compile
//! time, so it is modelled as an enum keyed by a stable id rather than looked
//! up by free-text name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Stable identifier of an agent persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    Nova,
    Pixel,
    Bolt,
    Scout,
}

impl AgentId {
    /// Every registered agent, in display order.
    pub const ALL: [AgentId; 4] = [AgentId::Nova, AgentId::Pixel, AgentId::Bolt, AgentId::Scout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nova => "nova",
            Self::Pixel => "pixel",
            Self::Bolt => "bolt",
            Self::Scout => "scout",
        }
    }

    /// Static profile for this agent.
    pub fn profile(&self) -> &'static AgentProfile {
        match self {
            Self::Nova => &NOVA,
            Self::Pixel => &PIXEL,
            Self::Bolt => &BOLT,
            Self::Scout => &SCOUT,
        }
    }

    /// Comma-separated list of valid ids, for diagnostics.
    pub fn valid_ids() -> String {
        Self::ALL
            .iter()
            .map(AgentId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                MonitorError::Config(format!(
                    "Unknown agent '{}'. Valid agents: {}",
                    s.trim(),
                    Self::valid_ids()
                ))
            })
    }
}

/// Display and matching data for one agent persona.
#[derive(Debug, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: AgentId,
    /// Display name, also the Slack username the agent posts under.
    pub name: &'static str,
    pub role: &'static str,
    pub emoji: &'static str,
    /// Slack emoji avatar used when no icon URL is configured.
    pub icon_emoji: &'static str,
    /// Spec document under `agent-docs/`.
    pub spec_file: &'static str,
    /// Aliases that count as a mention (matched case-insensitively).
    pub mentions: &'static [&'static str],
}

static NOVA: AgentProfile = AgentProfile {
    id: AgentId::Nova,
    name: "Nova",
    role: "Product Manager",
    emoji: "🌟",
    icon_emoji: ":star:",
    spec_file: "NOVA_SPEC.md",
    mentions: &["nova", "Nova", "@nova"],
};

static PIXEL: AgentProfile = AgentProfile {
    id: AgentId::Pixel,
    name: "Pixel",
    role: "UX Designer",
    emoji: "🎨",
    icon_emoji: ":art:",
    spec_file: "PIXEL_SPEC.md",
    mentions: &["pixel", "Pixel", "@pixel"],
};

static BOLT: AgentProfile = AgentProfile {
    id: AgentId::Bolt,
    name: "Bolt",
    role: "Full-Stack Developer",
    emoji: "⚡",
    icon_emoji: ":zap:",
    spec_file: "BOLT_SPEC.md",
    mentions: &["bolt", "Bolt", "@bolt"],
};

static SCOUT: AgentProfile = AgentProfile {
    id: AgentId::Scout,
    name: "Scout",
    role: "QA Engineer",
    emoji: "🔍",
    icon_emoji: ":mag:",
    spec_file: "SCOUT_SPEC.md",
    mentions: &["scout", "Scout", "@scout"],
};

impl AgentProfile {
    /// Whether `author` denotes this agent (case-insensitive substring on name).
    pub fn is_self(&self, author: &str) -> bool {
        author.to_lowercase().contains(&self.name.to_lowercase())
    }

    /// Whether `text` contains any of this agent's mention aliases.
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.mentions
            .iter()
            .any(|alias| text.contains(&alias.to_lowercase()))
    }

    /// A message needs a response as a mention: it names the agent and was
    /// not written by the agent itself.
    pub fn is_mention(&self, author: &str, text: &str) -> bool {
        !self.is_self(author) && self.is_mentioned_in(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("NOVA".parse::<AgentId>().unwrap(), AgentId::Nova);
        assert_eq!(" scout ".parse::<AgentId>().unwrap(), AgentId::Scout);
    }

    #[test]
    fn test_parse_unknown_lists_valid_ids() {
        let err = "zed".parse::<AgentId>().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("zed"));
        assert!(text.contains("nova, pixel, bolt, scout"));
    }

    #[test]
    fn test_profiles_match_ids() {
        for id in AgentId::ALL {
            assert_eq!(id.profile().id, id);
            assert_eq!(id.profile().name.to_lowercase(), id.as_str());
        }
    }

    #[test]
    fn test_mention_detection() {
        let nova = AgentId::Nova.profile();
        assert!(nova.is_mention("Arash", "hey NOVA can you check?"));
        assert!(nova.is_mention("Arash", "cc @nova"));
        assert!(!nova.is_mention("Arash", "hey pixel"));
    }

    #[test]
    fn test_self_messages_suppressed() {
        let nova = AgentId::Nova.profile();
        assert!(!nova.is_mention("Nova", "nova here, posting an update"));
        assert!(!nova.is_mention("nova (bot)", "ping nova"));
    }
}
