pub mod commands;
pub mod components;
pub mod gateway;
pub mod http_client;
pub mod interactions;
pub mod proxy;
pub mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::DiscordConfig;
use crate::transport::runtime::EventSource;

use self::gateway::{DiscordGateway, DiscordGatewayState, GatewayEvent};
use self::http_client::DiscordHttpClient;
use self::types::{ActivityType, DEFAULT_INTENTS};

pub use self::interactions::InteractionHandler;

/// Gateway listener for one bot token; resumable across reconnects.
pub struct DiscordListener {
    http: Arc<DiscordHttpClient>,
    bot_token: String,
    gateway_state: Arc<DiscordGatewayState>,
    intents: u64,
    presence: Option<serde_json::Value>,
}

impl DiscordListener {
    pub fn new(http: Arc<DiscordHttpClient>, bot_token: &str, config: &DiscordConfig) -> Self {
        Self {
            http,
            bot_token: bot_token.to_string(),
            gateway_state: Arc::new(DiscordGatewayState::default()),
            intents: config.intents.unwrap_or(DEFAULT_INTENTS),
            presence: build_presence(config),
        }
    }
}

fn build_presence(config: &DiscordConfig) -> Option<serde_json::Value> {
    let status = config.status.as_deref().unwrap_or("online");
    let activity_name = config.activity_name.as_deref()?;
    let activity_type = config
        .activity_type
        .and_then(ActivityType::from_u8)
        .unwrap_or(ActivityType::Playing);

    Some(serde_json::json!({
        "status": status,
        "activities": [{
            "name": activity_name,
            "type": activity_type as u8,
        }],
        "since": null,
        "afk": false,
    }))
}

impl EventSource for DiscordListener {
    fn name(&self) -> &str {
        "discord"
    }

    fn listen<'a>(
        &'a self,
        tx: tokio::sync::mpsc::Sender<GatewayEvent>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let gateway = DiscordGateway::new(
                self.bot_token.clone(),
                self.intents,
                Arc::clone(&self.gateway_state),
                self.presence.clone(),
            );
            gateway.connect_and_listen(&self.http, &tx).await
        })
    }
}
