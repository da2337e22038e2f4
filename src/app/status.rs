use crate::config::Config;

/// Show the first and last two characters of a secret, nothing for short ones.
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(value) => {
            let chars: Vec<char> = value.chars().collect();
            if chars.len() <= 8 {
                "****".to_string()
            } else {
                let head: String = chars[..2].iter().collect();
                let tail: String = chars[chars.len() - 2..].iter().collect();
                format!("{head}****{tail}")
            }
        }
    }
}

pub fn render_status(config: &Config) -> String {
    let ttl = if config.drafts.ttl_secs == 0 {
        "never".to_string()
    } else {
        format!("{}s", config.drafts.ttl_secs)
    };

    [
        format!("rewrite-relay {}", env!("CARGO_PKG_VERSION")),
        format!("config         {}", config.config_path.display()),
        String::new(),
        "Rewrite".to_string(),
        format!("  api key      {}", mask_secret(config.rewrite.api_key.as_deref())),
        format!("  model        {}", config.rewrite.model),
        format!("  endpoint     {}", config.rewrite.endpoint),
        format!("  max tokens   {}", config.rewrite.max_tokens),
        format!("  timeout      {}s", config.rewrite.timeout_secs),
        String::new(),
        "Discord".to_string(),
        format!("  bot token    {}", mask_secret(config.discord.bot_token.as_deref())),
        format!(
            "  application  {}",
            config.discord.application_id.as_deref().unwrap_or("(from gateway)")
        ),
        format!(
            "  guild        {}",
            config.discord.guild_id.as_deref().unwrap_or("(all guilds)")
        ),
        format!("  command      /{}", config.discord.command_name),
        format!("  proxy name   {}", config.discord.proxy_name),
        String::new(),
        "Drafts".to_string(),
        format!("  ttl          {ttl}"),
        format!("  max entries  {}", config.drafts.max_entries),
    ]
    .join("\n")
}
