//! Posting approved drafts into a channel under the author's identity.
//!
//! Each channel gets one webhook named after the configured proxy name. The
//! webhook is reused for every author; per-message `username` and
//! `avatar_url` make the post look like the author's own. When the webhook
//! route fails the text is posted by the bot itself.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::gateway::InteractionUser;
use super::http_client::{DiscordHttpClient, WebhookHandle, webhook_handle};
use super::types::{CDN_BASE, INCOMING_WEBHOOK, MAX_MESSAGE_LENGTH, MAX_WEBHOOK_USERNAME_LENGTH};
use crate::error::TransportError;
use crate::providers::char_prefix;

/// Display identity borrowed for a proxied post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ProxyIdentity {
    /// Guild nickname, then global name, then username; guild avatar, then
    /// user avatar, then the default avatar for the user id.
    pub fn from_user(user: &InteractionUser, guild_id: Option<&str>) -> Self {
        let display_name = user
            .nick
            .as_deref()
            .or(user.global_name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&user.username)
            .trim()
            .to_string();

        let guild_avatar = user
            .guild_avatar
            .as_deref()
            .zip(guild_id)
            .map(|(hash, guild)| {
                format!(
                    "{CDN_BASE}/guilds/{guild}/users/{}/avatars/{hash}.{}",
                    user.id,
                    avatar_extension(hash)
                )
            });
        let avatar_url = guild_avatar
            .or_else(|| {
                user.avatar.as_deref().map(|hash| {
                    format!(
                        "{CDN_BASE}/avatars/{}/{hash}.{}",
                        user.id,
                        avatar_extension(hash)
                    )
                })
            })
            .or_else(|| Some(default_avatar_url(&user.id)));

        Self {
            display_name,
            avatar_url,
        }
    }
}

fn avatar_extension(hash: &str) -> &'static str {
    if hash.starts_with("a_") { "gif" } else { "png" }
}

/// Default avatar index for accounts on the new username system.
fn default_avatar_url(user_id: &str) -> String {
    let index = user_id.parse::<u64>().map_or(0, |id| (id >> 22) % 6);
    format!("{CDN_BASE}/embed/avatars/{index}.png")
}

/// Which route ended up delivering the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRoute {
    Webhook,
    BotFallback,
}

pub struct SendProxy {
    http: Arc<DiscordHttpClient>,
    proxy_name: String,
    webhooks: Mutex<HashMap<String, WebhookHandle>>,
}

impl SendProxy {
    pub fn new(http: Arc<DiscordHttpClient>, proxy_name: impl Into<String>) -> Self {
        Self {
            http,
            proxy_name: proxy_name.into(),
            webhooks: Mutex::new(HashMap::new()),
        }
    }

    /// Post `text` in `channel_id` as `identity`.
    ///
    /// `application_id` narrows webhook reuse to webhooks this application
    /// created. Long text is posted as several messages.
    pub async fn send(
        &self,
        channel_id: &str,
        identity: &ProxyIdentity,
        text: &str,
        application_id: Option<&str>,
    ) -> Result<SendRoute> {
        let parts = split_ranges(text, MAX_MESSAGE_LENGTH);

        let webhook = match self.webhook_for(channel_id, application_id).await {
            Ok(webhook) => Some(webhook),
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "proxy.webhook_unavailable");
                None
            }
        };

        let mut delivered = 0;
        if let Some(webhook) = webhook {
            for part in &parts {
                if let Err(e) = self.execute(&webhook, identity, &text[part.clone()]).await {
                    tracing::warn!(channel_id, error = %e, "proxy.webhook_execute_failed");
                    self.webhooks.lock().await.remove(channel_id);
                    break;
                }
                delivered += 1;
            }
            if delivered == parts.len() {
                tracing::info!(channel_id, parts = parts.len(), "proxy.sent_via_webhook");
                return Ok(SendRoute::Webhook);
            }
        }

        // The rest of the original text, so paragraph breaks survive.
        let remaining = parts.get(delivered).map_or("", |part| &text[part.start..]);
        if let Err(e) = self.send_as_bot(channel_id, identity, remaining).await {
            if delivered > 0 {
                tracing::warn!(channel_id, delivered, error = %e, "proxy.partial_delivery");
                return Err(TransportError::PartialDelivery {
                    delivered,
                    total: parts.len(),
                }
                .into());
            }
            return Err(e.context("post draft through bot fallback"));
        }
        tracing::info!(channel_id, "proxy.sent_via_bot");
        Ok(SendRoute::BotFallback)
    }

    async fn webhook_for(
        &self,
        channel_id: &str,
        application_id: Option<&str>,
    ) -> Result<WebhookHandle> {
        if let Some(cached) = self.webhooks.lock().await.get(channel_id) {
            return Ok(cached.clone());
        }

        let existing = self
            .http
            .list_channel_webhooks(channel_id)
            .await?
            .iter()
            .find(|webhook| self.is_reusable(webhook, application_id))
            .and_then(webhook_handle);

        let webhook = match existing {
            Some(webhook) => webhook,
            None => {
                let created = self
                    .http
                    .create_webhook(channel_id, &self.proxy_name)
                    .await?;
                tracing::info!(channel_id, "proxy.webhook_created");
                created
            }
        };

        self.webhooks
            .lock()
            .await
            .insert(channel_id.to_string(), webhook.clone());
        Ok(webhook)
    }

    fn is_reusable(&self, webhook: &Value, application_id: Option<&str>) -> bool {
        let incoming = webhook.get("type").and_then(Value::as_u64) == Some(INCOMING_WEBHOOK);
        let named = webhook.get("name").and_then(Value::as_str) == Some(self.proxy_name.as_str());
        let owned = match application_id {
            Some(app) => webhook.get("application_id").and_then(Value::as_str) == Some(app),
            None => true,
        };
        incoming && named && owned
    }

    async fn execute(
        &self,
        webhook: &WebhookHandle,
        identity: &ProxyIdentity,
        content: &str,
    ) -> Result<()> {
        let mut body = json!({
            "content": content,
            "username": char_prefix(&identity.display_name, MAX_WEBHOOK_USERNAME_LENGTH),
            "allowed_mentions": {"parse": []},
        });
        if let Some(avatar_url) = &identity.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }
        self.http.execute_webhook(webhook, body).await?;
        Ok(())
    }

    async fn send_as_bot(&self, channel_id: &str, identity: &ProxyIdentity, text: &str) -> Result<()> {
        let attributed = format!(
            "**{}:** {text}",
            escape_markdown(&identity.display_name)
        );
        for part in split_message(&attributed, MAX_MESSAGE_LENGTH) {
            self.http
                .send_message(
                    channel_id,
                    json!({ "content": part, "allowed_mentions": {"parse": []} }),
                )
                .await?;
        }
        Ok(())
    }
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '_' | '~' | '`' | '|' | '\\' | '>') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Byte ranges of `text` holding parts of at most `max_chars` characters.
///
/// Breaks at the last whitespace inside the window when there is one, and
/// hard-splits words longer than the window. Whitespace at the break is left
/// out of both neighbouring parts.
pub fn split_ranges(text: &str, max_chars: usize) -> Vec<Range<usize>> {
    let max_chars = max_chars.max(1);
    let mut ranges = Vec::new();
    let end = text.trim_end().len();
    let mut start = text.len() - text.trim_start().len();

    while start < end {
        let rest = &text[start..end];
        if rest.chars().count() <= max_chars {
            ranges.push(start..end);
            break;
        }

        let window_end = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(index, _)| index);
        let split_at = rest[..window_end]
            .char_indices()
            .rev()
            .find(|(_, ch)| ch.is_whitespace())
            .map(|(index, _)| index)
            .filter(|&index| index > 0)
            .unwrap_or(window_end);

        let part_end = start + rest[..split_at].trim_end().len();
        if part_end > start {
            ranges.push(start..part_end);
        }
        let after = &rest[split_at..];
        start += split_at + (after.len() - after.trim_start().len());
    }
    ranges
}

/// Split `text` into parts of at most `max_chars` characters.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    split_ranges(text, max_chars)
        .into_iter()
        .map(|range| text[range].to_string())
        .collect()
}
