use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use reqwest::{Method, Response, header::HeaderMap};
use serde_json::{Value, json};
use tokio::{sync::Mutex, time::sleep};

use super::types::API_BASE;
use crate::error::TransportError;
use crate::providers::{char_prefix, scrub_secret_patterns};

const MAX_RATE_LIMIT_RETRIES: u8 = 3;
const ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Clone)]
struct RateLimitBucket {
    remaining: u32,
    reset_at: f64,
}

/// Webhook credentials needed to execute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHandle {
    pub id: String,
    pub token: String,
}

pub struct DiscordHttpClient {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    buckets: Arc<Mutex<HashMap<String, RateLimitBucket>>>,
    global_reset_at: Arc<Mutex<Option<f64>>>,
}

impl DiscordHttpClient {
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_base_url(bot_token, API_BASE)
    }

    /// Point the client at another API root, e.g. a local mock server.
    #[must_use]
    pub fn with_base_url(bot_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            global_reset_at: Arc::new(Mutex::new(None)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get_gateway_bot(&self) -> Result<Value> {
        let response = self
            .request(Method::GET, &self.url("/gateway/bot"), None)
            .await
            .context("fetch Discord gateway bot data")?;
        response
            .json()
            .await
            .context("parse Discord gateway bot JSON")
    }

    /// The application owning the bot token.
    pub async fn get_current_application(&self) -> Result<Value> {
        let response = self
            .request(Method::GET, &self.url("/applications/@me"), None)
            .await
            .context("fetch current Discord application")?;
        response
            .json()
            .await
            .context("parse current Discord application JSON")
    }

    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response_type: u8,
        data: Option<Value>,
    ) -> Result<()> {
        let url = self.url(&format!(
            "/interactions/{interaction_id}/{interaction_token}/callback"
        ));
        let mut body = json!({ "type": response_type });
        if let Some(payload) = data {
            body["data"] = payload;
        }
        let _response = self
            .request(Method::POST, &url, Some(body))
            .await
            .context("create Discord interaction response")?;
        Ok(())
    }

    pub async fn edit_original_interaction_response(
        &self,
        application_id: &str,
        interaction_token: &str,
        body: Value,
    ) -> Result<()> {
        let url = self.url(&format!(
            "/webhooks/{application_id}/{interaction_token}/messages/@original"
        ));
        let _response = self
            .request(Method::PATCH, &url, Some(body))
            .await
            .context("edit original Discord interaction response")?;
        Ok(())
    }

    pub async fn create_followup_message(
        &self,
        application_id: &str,
        interaction_token: &str,
        body: Value,
    ) -> Result<()> {
        let url = self.url(&format!("/webhooks/{application_id}/{interaction_token}"));
        let _response = self
            .request(Method::POST, &url, Some(body))
            .await
            .context("create Discord interaction followup")?;
        Ok(())
    }

    pub async fn register_commands(
        &self,
        application_id: &str,
        guild_id: Option<&str>,
        commands: &[Value],
    ) -> Result<()> {
        let path = if let Some(guild) = guild_id {
            format!("/applications/{application_id}/guilds/{guild}/commands")
        } else {
            format!("/applications/{application_id}/commands")
        };

        let _response = self
            .request(Method::PUT, &self.url(&path), Some(json!(commands)))
            .await
            .context("register Discord application commands")?;
        Ok(())
    }

    pub async fn send_message(&self, channel_id: &str, body: Value) -> Result<Value> {
        let url = self.url(&format!("/channels/{channel_id}/messages"));
        let response = self
            .request(Method::POST, &url, Some(body))
            .await
            .context("send Discord message")?;
        response
            .json()
            .await
            .context("parse Discord send message response JSON")
    }

    pub async fn list_channel_webhooks(&self, channel_id: &str) -> Result<Vec<Value>> {
        let url = self.url(&format!("/channels/{channel_id}/webhooks"));
        let response = self
            .request(Method::GET, &url, None)
            .await
            .context("list Discord channel webhooks")?;
        response
            .json()
            .await
            .context("parse Discord channel webhooks JSON")
    }

    pub async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<WebhookHandle> {
        let url = self.url(&format!("/channels/{channel_id}/webhooks"));
        let response = self
            .request(Method::POST, &url, Some(json!({ "name": name })))
            .await
            .context("create Discord channel webhook")?;
        let body: Value = response
            .json()
            .await
            .context("parse Discord webhook JSON")?;
        webhook_handle(&body).context("Discord webhook response missing id or token")
    }

    /// Execute a webhook and wait for the created message.
    pub async fn execute_webhook(&self, webhook: &WebhookHandle, body: Value) -> Result<Value> {
        let url = self.url(&format!("/webhooks/{}/{}?wait=true", webhook.id, webhook.token));
        let response = self
            .request(Method::POST, &url, Some(body))
            .await
            .context("execute Discord webhook")?;
        response
            .json()
            .await
            .context("parse Discord webhook message JSON")
    }

    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Response> {
        let route_key = Self::bucket_key_from_url(url);
        self.wait_for_limits(&route_key).await;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let mut request_builder = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bot {}", self.bot_token));
            if let Some(payload) = body.clone() {
                request_builder = request_builder.json(&payload);
            }

            let response = request_builder
                .send()
                .await
                .with_context(|| format!("send Discord request {} {route_key}", method.as_str()))?;

            self.update_bucket_from_headers(&route_key, response.headers())
                .await;

            if response.status().as_u16() == 429 {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    anyhow::bail!(
                        "Discord request {} {route_key} exceeded rate limit after {MAX_RATE_LIMIT_RETRIES} retries",
                        method.as_str(),
                    );
                }
                let is_global = Self::is_global_limit(response.headers());
                let retry_after = Self::parse_retry_after(response.headers())
                    .unwrap_or_else(|| Duration::from_secs(1));
                tracing::debug!(
                    route = %route_key,
                    is_global,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "discord.rate_limited"
                );
                self.handle_429_wait(is_global, retry_after, &route_key)
                    .await;
                continue;
            }

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body_text = response
                    .text()
                    .await
                    .unwrap_or_else(|error| format!("<failed to read response body: {error}>"));
                return Err(TransportError::Discord {
                    route: format!("{} {route_key}", method.as_str()),
                    status,
                    message: discord_error_message(&body_text),
                }
                .into());
            }

            return Ok(response);
        }

        anyhow::bail!(
            "Discord request {} {route_key} failed due to rate limiting",
            method.as_str()
        )
    }

    fn parse_header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
    }

    fn parse_header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok())
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        let seconds = Self::parse_header_f64(headers, "Retry-After")?;
        if seconds <= 0.0 {
            return Some(Duration::from_secs(0));
        }
        Some(Duration::from_secs_f64(seconds))
    }

    fn is_global_limit(headers: &HeaderMap) -> bool {
        headers
            .get("X-RateLimit-Global")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    fn now_unix_timestamp() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// Route key with snowflakes and tokens collapsed, so it is safe to log.
    fn bucket_key_from_url(url: &str) -> String {
        let path = reqwest::Url::parse(url)
            .map_or_else(|_| url.to_string(), |parsed| parsed.path().to_string());
        let path_without_api_prefix = path
            .strip_prefix("/api/v10")
            .map_or(path.as_str(), |stripped| stripped);

        let segments: Vec<&str> = path_without_api_prefix
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let normalized = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let follows_id = index > 0
                    && segments[index - 1]
                        .chars()
                        .all(|character| character.is_ascii_digit());
                let in_token_slot = index >= 2
                    && matches!(segments[index - 2], "webhooks" | "interactions")
                    && follows_id;
                if segment.chars().all(|character| character.is_ascii_digit()) {
                    "{id}".to_string()
                } else if in_token_slot {
                    "{token}".to_string()
                } else {
                    (*segment).to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        format!("/{normalized}")
    }

    async fn wait_for_limits(&self, route_key: &str) {
        let now = Self::now_unix_timestamp();
        let global_wait = {
            let global_guard = self.global_reset_at.lock().await;
            global_guard.and_then(|reset_at| (reset_at > now).then_some(reset_at - now))
        };
        if let Some(wait_secs) = global_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }

        let route_wait = {
            let buckets = self.buckets.lock().await;
            buckets.get(route_key).and_then(|bucket| {
                (bucket.remaining == 0 && bucket.reset_at > now).then_some(bucket.reset_at - now)
            })
        };
        if let Some(wait_secs) = route_wait {
            sleep(Duration::from_secs_f64(wait_secs)).await;
        }
    }

    async fn handle_429_wait(&self, is_global: bool, retry_after: Duration, route_key: &str) {
        let reset_at = Self::now_unix_timestamp() + retry_after.as_secs_f64();
        if is_global {
            *self.global_reset_at.lock().await = Some(reset_at);
        } else {
            self.buckets.lock().await.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining: 0,
                    reset_at,
                },
            );
        }
        sleep(retry_after).await;
    }

    async fn update_bucket_from_headers(&self, route_key: &str, headers: &HeaderMap) {
        let remaining = Self::parse_header_u32(headers, "X-RateLimit-Remaining");
        let reset_at = Self::parse_header_f64(headers, "X-RateLimit-Reset");

        if let (Some(remaining), Some(reset_at)) = (remaining, reset_at) {
            self.buckets.lock().await.insert(
                route_key.to_string(),
                RateLimitBucket {
                    remaining,
                    reset_at,
                },
            );
        }
    }
}

/// `id` and `token` of a webhook object; `None` when it cannot be executed.
pub fn webhook_handle(webhook: &Value) -> Option<WebhookHandle> {
    let id = webhook.get("id")?.as_str()?;
    let token = webhook.get("token")?.as_str()?;
    if id.is_empty() || token.is_empty() {
        return None;
    }
    Some(WebhookHandle {
        id: id.to_string(),
        token: token.to_string(),
    })
}

/// Discord error bodies look like `{"code": 50013, "message": "Missing Permissions"}`.
fn discord_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| {
            let message = value.get("message")?.as_str()?;
            Some(match value.get("code").and_then(Value::as_u64) {
                Some(code) => format!("{message} (code {code})"),
                None => message.to_string(),
            })
        })
        .unwrap_or_else(|| char_prefix(body.trim(), ERROR_BODY_CHARS).to_string());
    scrub_secret_patterns(&message).into_owned()
}
