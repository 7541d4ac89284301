//! Operator settings file (`~/.agent_settings.json`).
//!
//! Written by the onboarding flow; the monitor only reads it to find the
//! default agent identity and channel.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::AgentId;
use crate::error::MonitorResult;

/// Default settings file name under the home directory.
pub const SETTINGS_FILE_NAME: &str = ".agent_settings.json";

/// Contents of the settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    /// Channel name, e.g. `#logo-creator`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<String>,
    /// Channel id, preferred over the name for API calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Base URL hosting `<agent>.png` avatars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_base_url: Option<String>,
}

impl AgentSettings {
    /// Default settings path (`~/.agent_settings.json`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    /// Load settings, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    debug!(path = %path.display(), "Loaded agent settings");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), "Could not parse settings: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), "Could not read settings: {}", e);
                Self::default()
            }
        }
    }

    /// Resolve the agent: explicit choice first, then the settings default.
    ///
    /// Returns `Ok(None)` when neither is set.
    pub fn resolve_agent(&self, explicit: Option<&str>) -> MonitorResult<Option<AgentId>> {
        let chosen = explicit
            .or(self.default_agent.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty());
        chosen.map(|id| id.parse::<AgentId>()).transpose()
    }

    /// Resolve the channel: explicit choice, then channel id, then channel name.
    pub fn resolve_channel(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .or(self.default_channel_id.as_deref())
            .or(self.default_channel.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Avatar URL for an agent, when an avatar host is configured.
    pub fn avatar_url(&self, agent: AgentId) -> Option<String> {
        self.avatar_base_url
            .as_deref()
            .map(|base| format!("{}/{}.png", base.trim_end_matches('/'), agent.as_str()))
    }
}
