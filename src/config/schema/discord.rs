use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Learned from the gateway READY payload when not configured.
    #[serde(default)]
    pub application_id: Option<String>,
    /// Restricts command registration and interaction handling to one guild.
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub intents: Option<u64>,
    #[serde(default = "default_command_name")]
    pub command_name: String,
    #[serde(default = "default_command_description")]
    pub command_description: String,
    /// Name given to the per-channel webhook used to post as the user.
    #[serde(default = "default_proxy_name")]
    pub proxy_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub activity_type: Option<u8>,
    #[serde(default)]
    pub activity_name: Option<String>,
}

fn default_command_name() -> String {
    "rewrite".into()
}

fn default_command_description() -> String {
    "Privately draft a message and post a polished rewrite of it".into()
}

fn default_proxy_name() -> String {
    "Rewrite Relay".into()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl DiscordConfig {
    /// Drop blank identifiers and restore blank names to their defaults.
    pub(crate) fn normalize(&mut self) {
        self.bot_token = trimmed(self.bot_token.take());
        self.application_id = trimmed(self.application_id.take());
        self.guild_id = trimmed(self.guild_id.take());
        if self.command_name.trim().is_empty() {
            self.command_name = default_command_name();
        }
        if self.proxy_name.trim().is_empty() {
            self.proxy_name = default_proxy_name();
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            application_id: None,
            guild_id: None,
            intents: None,
            command_name: default_command_name(),
            command_description: default_command_description(),
            proxy_name: default_proxy_name(),
            status: None,
            activity_type: None,
            activity_name: None,
        }
    }
}
