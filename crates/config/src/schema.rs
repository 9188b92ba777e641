use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crosstalk_slack::TeamConfig;

/// Root configuration, conventionally `./.env.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosstalkConfig {
    /// Workspace connections, keyed by team name.
    pub teams: HashMap<String, TeamConfig>,

    #[serde(default)]
    pub handlers: HandlersConfig,

    #[serde(default)]
    pub highlight: HighlightConfig,
}

/// Per-handler toggles. Absent sections fall back to: console on, the
/// placeholders off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlersConfig {
    pub console: ConsoleConfig,
    pub notification: NotificationConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Command invoked per spoken message.
    pub command: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "say".into(),
        }
    }
}

/// Highlight keyword specs, `/pattern/flags` strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub keywords: Vec<String>,
}
