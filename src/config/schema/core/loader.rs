use super::Config;
use super::types::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    /// Load `~/.rewrite-relay/config.toml` when present, then apply
    /// environment overrides. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let config_path = home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            tracing::debug!(path = %config_path.display(), "config file not found; using defaults");
            Self::default()
        };
        config.config_path = config_path.to_path_buf();

        config.apply_env_overrides();
        config.rewrite.normalize();
        config.discord.normalize();
        Ok(config)
    }

    /// The bot token, or a validation error naming the variable to set.
    pub fn require_discord_token(&self) -> std::result::Result<&str, ConfigError> {
        self.discord.bot_token.as_deref().ok_or_else(|| {
            ConfigError::Validation("Discord bot token not set. Set DISCORD_TOKEN.".into())
        })
    }
}
