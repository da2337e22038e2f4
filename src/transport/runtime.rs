use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::{Config, ReliabilityConfig};
use crate::drafts::DraftStore;
use crate::providers::{AnthropicRewriter, Rewriter};
use crate::transport::discord::commands::{build_commands, register_commands};
use crate::transport::discord::gateway::GatewayEvent;
use crate::transport::discord::http_client::DiscordHttpClient;
use crate::transport::discord::{DiscordListener, InteractionHandler};

const MIN_INITIAL_BACKOFF_SECS: u64 = 1;
const EVENT_QUEUE_CAPACITY: usize = 100;

/// A long-lived connection that pushes gateway events until it drops.
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    fn listen<'a>(
        &'a self,
        tx: mpsc::Sender<GatewayEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

pub(crate) fn backoff_settings(reliability: &ReliabilityConfig) -> (u64, u64) {
    let initial_backoff_secs = reliability
        .gateway_initial_backoff_secs
        .max(MIN_INITIAL_BACKOFF_SECS);
    let max_backoff_secs = reliability
        .gateway_max_backoff_secs
        .max(initial_backoff_secs);

    (initial_backoff_secs, max_backoff_secs)
}

/// Keep `source` connected, reconnecting with exponential backoff.
///
/// Stops once the receiving side of `tx` is gone.
pub(crate) fn spawn_supervised_listener(
    source: Arc<dyn EventSource>,
    tx: mpsc::Sender<GatewayEvent>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(MIN_INITIAL_BACKOFF_SECS);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            tracing::debug!(source = source.name(), "listener.starting");
            let result = source.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::info!(source = source.name(), "listener.reconnecting");
                    // A session that ended cleanly was healthy.
                    backoff = initial_backoff_secs.max(MIN_INITIAL_BACKOFF_SECS);
                }
                Err(e) => {
                    tracing::error!(
                        source = source.name(),
                        backoff_secs = backoff,
                        error = %format!("{e:#}"),
                        "listener.failed"
                    );
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

/// Periodically drop expired drafts.
pub(crate) fn spawn_draft_sweeper(
    drafts: Arc<DraftStore>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = drafts.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = drafts.len(), "drafts.purged");
            }
        }
    })
}

/// Register the slash command for the configured (or owning) application.
pub async fn register(config: &Config) -> Result<String> {
    let token = config.require_discord_token()?;
    let http = DiscordHttpClient::new(token);
    let application_id = match &config.discord.application_id {
        Some(id) => id.clone(),
        None => http
            .get_current_application()
            .await?
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .context("Discord application response missing id")?,
    };

    register_commands(
        &http,
        &application_id,
        config.discord.guild_id.as_deref(),
        &build_commands(&config.discord),
    )
    .await?;
    Ok(application_id)
}

/// Run the bot until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let token = config.require_discord_token()?;
    if config.rewrite.api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY is not set; every rewrite will fail until it is");
    }

    let http = Arc::new(DiscordHttpClient::new(token));
    let anthropic = AnthropicRewriter::new(&config.rewrite);
    tracing::info!(provider = anthropic.name(), model = anthropic.model(), "rewrite.provider");
    let rewriter: Arc<dyn Rewriter> = Arc::new(anthropic);
    let drafts = Arc::new(DraftStore::new(&config.drafts));
    let handler = Arc::new(InteractionHandler::new(
        Arc::clone(&http),
        rewriter,
        Arc::clone(&drafts),
        &config.discord,
    ));
    let listener: Arc<dyn EventSource> =
        Arc::new(DiscordListener::new(Arc::clone(&http), token, &config.discord));

    let (tx, mut rx) = mpsc::channel::<GatewayEvent>(EVENT_QUEUE_CAPACITY);
    let (initial_backoff, max_backoff) = backoff_settings(&config.reliability);
    let listener_handle = spawn_supervised_listener(listener, tx, initial_backoff, max_backoff);
    let sweeper_handle = (config.drafts.ttl_secs > 0)
        .then(|| spawn_draft_sweeper(Arc::clone(&drafts), config.drafts.sweep_interval_secs));

    tracing::info!(
        guild_id = config.discord.guild_id.as_deref().unwrap_or("all"),
        draft_ttl_secs = config.drafts.ttl_secs,
        "bot.starting"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut commands_registered = false;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    tracing::warn!("bot.event_stream_closed");
                    break;
                };
                match event {
                    GatewayEvent::Ready { user_id, application_id, .. } => {
                        tracing::info!(user_id = %user_id, "bot.ready");
                        if let Some(app_id) = application_id.as_deref() {
                            handler.learn_application_id(app_id);
                        }
                        if !commands_registered {
                            commands_registered =
                                register_on_ready(&http, &handler, config).await;
                        }
                    }
                    GatewayEvent::InteractionCreate(interaction) => {
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move { handler.handle(*interaction).await });
                    }
                }
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "bot.signal_listener_failed");
                }
                tracing::info!("bot.shutting_down");
                break;
            }
        }
    }

    listener_handle.abort();
    if let Some(handle) = sweeper_handle {
        handle.abort();
    }
    Ok(())
}

async fn register_on_ready(
    http: &DiscordHttpClient,
    handler: &InteractionHandler,
    config: &Config,
) -> bool {
    let Some(application_id) = handler.application_id() else {
        tracing::warn!("bot.application_id_unknown; slash command not registered");
        return false;
    };
    match register_commands(
        http,
        &application_id,
        config.discord.guild_id.as_deref(),
        &build_commands(&config.discord),
    )
    .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "bot.command_registration_failed");
            false
        }
    }
}
