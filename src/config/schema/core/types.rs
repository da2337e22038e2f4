use super::super::{DiscordConfig, DraftsConfig, RewriteConfig};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub(super) const CONFIG_DIR_NAME: &str = ".rewrite-relay";
pub(super) const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub rewrite: RewriteConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub drafts: DraftsConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

/// Reconnect pacing for the Discord gateway listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_gateway_backoff_secs")]
    pub gateway_initial_backoff_secs: u64,
    #[serde(default = "default_gateway_backoff_max_secs")]
    pub gateway_max_backoff_secs: u64,
}

fn default_gateway_backoff_secs() -> u64 {
    2
}

fn default_gateway_backoff_max_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            gateway_initial_backoff_secs: default_gateway_backoff_secs(),
            gateway_max_backoff_secs: default_gateway_backoff_max_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
            rewrite: RewriteConfig::default(),
            discord: DiscordConfig::default(),
            drafts: DraftsConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}
