use super::Config;

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_var("ANTHROPIC_API_KEY") {
            self.rewrite.api_key = Some(key);
        }

        if let Some(model) = non_empty_var("ANTHROPIC_MODEL") {
            self.rewrite.model = model;
        }

        if let Some(endpoint) = non_empty_var("ANTHROPIC_API_URL") {
            self.rewrite.endpoint = endpoint;
        }

        if let Some(secs) = non_empty_var("REWRITE_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse::<u64>()
            && secs > 0
        {
            self.rewrite.timeout_secs = secs;
        }

        if let Some(tokens) = non_empty_var("REWRITE_MAX_TOKENS")
            && let Ok(tokens) = tokens.parse::<u32>()
            && tokens > 0
        {
            self.rewrite.max_tokens = tokens;
        }

        if let Some(token) = non_empty_var("DISCORD_TOKEN") {
            self.discord.bot_token = Some(token);
        }

        if let Some(app_id) = non_empty_var("DISCORD_APPLICATION_ID") {
            self.discord.application_id = Some(app_id);
        }

        if let Some(guild_id) = non_empty_var("DISCORD_GUILD_ID") {
            self.discord.guild_id = Some(guild_id);
        }

        if let Some(ttl) = non_empty_var("DRAFT_TTL_SECS")
            && let Ok(ttl) = ttl.parse::<u64>()
        {
            self.drafts.ttl_secs = ttl;
        }
    }
}
