use anyhow::Result;
use serde_json::{Value, json};

use super::http_client::DiscordHttpClient;
use super::types::CHAT_INPUT_COMMAND;
use crate::config::DiscordConfig;

/// Guild-install context; the proxy needs a guild channel with webhooks.
const GUILD_CONTEXT: u8 = 0;

pub fn build_commands(config: &DiscordConfig) -> Vec<Value> {
    vec![json!({
        "name": config.command_name,
        "description": config.command_description,
        "type": CHAT_INPUT_COMMAND,
        "contexts": [GUILD_CONTEXT],
    })]
}

pub async fn register_commands(
    http: &DiscordHttpClient,
    application_id: &str,
    guild_id: Option<&str>,
    commands: &[Value],
) -> Result<()> {
    http.register_commands(application_id, guild_id, commands)
        .await?;
    tracing::info!(
        application_id,
        guild_id = guild_id.unwrap_or("global"),
        count = commands.len(),
        "discord.commands_registered"
    );
    Ok(())
}

/// Whether an application command payload invokes `command_name`.
pub fn is_command(data: &Value, command_name: &str) -> bool {
    data.get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| name == command_name)
}
