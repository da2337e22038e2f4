use serde::{Deserialize, Serialize};

pub const DEFAULT_REWRITE_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_REWRITE_MODEL: &str = "claude-3-5-sonnet-latest";

/// Rewrite provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Provider API key. Required before any rewrite is attempted.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Generation budget in provider tokens, not characters.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Wall-clock limit for one rewrite request, body read included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_REWRITE_MODEL.into()
}

fn default_endpoint() -> String {
    DEFAULT_REWRITE_ENDPOINT.into()
}

fn default_max_tokens() -> u32 {
    400
}

fn default_timeout_secs() -> u64 {
    20
}

impl RewriteConfig {
    /// Replace blank or zero values with their defaults.
    pub(crate) fn normalize(&mut self) {
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        if self.endpoint.trim().is_empty() {
            self.endpoint = default_endpoint();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        self.api_key = self
            .api_key
            .take()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
