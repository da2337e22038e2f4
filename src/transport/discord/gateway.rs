use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::{Instant, interval};
use tokio_tungstenite::tungstenite::Message;

use super::http_client::DiscordHttpClient;
use super::types::{DEFAULT_GATEWAY_URL, DEFAULT_HEARTBEAT_INTERVAL_MS, GatewayOpcode};

/// Session data kept across reconnects so the next connection can resume.
#[derive(Debug)]
pub struct DiscordGatewayState {
    pub session_id: Mutex<Option<String>>,
    pub sequence: AtomicI64,
    pub resume_gateway_url: Mutex<Option<String>>,
}

impl Default for DiscordGatewayState {
    fn default() -> Self {
        Self {
            session_id: Mutex::new(None),
            sequence: AtomicI64::new(-1),
            resume_gateway_url: Mutex::new(None),
        }
    }
}

/// Who triggered an interaction, as far as display identity goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InteractionUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    /// Guild nickname, only present for guild interactions.
    pub nick: Option<String>,
    pub avatar: Option<String>,
    /// Guild-specific avatar hash.
    pub guild_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub kind: u64,
    pub application_id: Option<String>,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub user: InteractionUser,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready {
        session_id: String,
        resume_gateway_url: String,
        user_id: String,
        application_id: Option<String>,
    },
    InteractionCreate(Box<Interaction>),
}

pub struct DiscordGateway {
    bot_token: String,
    intents: u64,
    state: Arc<DiscordGatewayState>,
    presence: Option<Value>,
}

impl DiscordGateway {
    pub fn new(
        bot_token: String,
        intents: u64,
        state: Arc<DiscordGatewayState>,
        presence: Option<Value>,
    ) -> Self {
        Self {
            bot_token,
            intents,
            state,
            presence,
        }
    }

    /// Run one gateway connection until it needs to be re-established.
    ///
    /// `Ok(())` means the session ended in a way the caller should reconnect
    /// from (op 7, op 9, missing ACK, closed socket).
    pub async fn connect_and_listen(
        &self,
        http: &DiscordHttpClient,
        tx: &tokio::sync::mpsc::Sender<GatewayEvent>,
    ) -> Result<()> {
        let gateway_url = self.resolve_gateway_url(http).await?;
        let ws_url = build_gateway_ws_url(&gateway_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .with_context(|| format!("connect Discord gateway websocket: {ws_url}"))?;
        let (mut write, mut read) = ws_stream.split();

        let heartbeat_interval_ms = read_hello_heartbeat_interval(&mut read).await?;
        self.send_identify_or_resume(&mut write).await?;
        tracing::debug!(heartbeat_interval_ms, "gateway.connected");

        let mut heartbeat = interval(Duration::from_millis(heartbeat_interval_ms));
        let heartbeat_acked = AtomicBool::new(true);
        let mut ack_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !self
                        .send_heartbeat_if_healthy(&mut write, &heartbeat_acked, &mut ack_deadline, heartbeat_interval_ms)
                        .await?
                    {
                        tracing::warn!("gateway.heartbeat_ack_missing");
                        return Ok(());
                    }
                }
                () = wait_for_ack_timeout(ack_deadline) => {
                    if !heartbeat_acked.load(Ordering::SeqCst) {
                        tracing::warn!("gateway.heartbeat_ack_timeout");
                        return Ok(());
                    }
                    ack_deadline = None;
                }
                message = read.next() => {
                    let Some(message) = message else {
                        tracing::warn!("gateway.socket_closed");
                        return Ok(());
                    };

                    let message = message.context("read Discord gateway message")?;
                    if !self
                        .handle_gateway_message(message, tx, &mut write, &heartbeat_acked, &mut ack_deadline, heartbeat_interval_ms)
                        .await?
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn resolve_gateway_url(&self, http: &DiscordHttpClient) -> Result<String> {
        if let Some(url) = self.state.resume_gateway_url.lock().await.clone()
            && !url.is_empty()
        {
            return Ok(url);
        }

        let gw_resp = http
            .get_gateway_bot()
            .await
            .context("fetch Discord gateway/bot URL")?;
        Ok(gw_resp
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_GATEWAY_URL)
            .to_string())
    }

    fn identify_payload(&self) -> Value {
        let mut identify_data = json!({
            "token": self.bot_token,
            "intents": self.intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": env!("CARGO_PKG_NAME")
            }
        });
        if let Some(presence) = &self.presence {
            identify_data["presence"] = presence.clone();
        }
        json!({
            "op": GatewayOpcode::Identify as u8,
            "d": identify_data,
        })
    }

    async fn send_identify_or_resume<WsSink>(&self, write: &mut WsSink) -> Result<()>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if let Some(session_id) = self.state.session_id.lock().await.clone() {
            let payload = json!({
                "op": GatewayOpcode::Resume as u8,
                "d": {
                    "token": self.bot_token,
                    "session_id": session_id,
                    "seq": self.current_sequence_value(),
                }
            });
            write
                .send(Message::Text(payload.to_string().into()))
                .await
                .context("send Discord gateway resume")?;
            tracing::debug!("gateway.resume_sent");
            return Ok(());
        }

        write
            .send(Message::Text(self.identify_payload().to_string().into()))
            .await
            .context("send Discord gateway identify")
    }

    async fn send_heartbeat_if_healthy<WsSink>(
        &self,
        write: &mut WsSink,
        heartbeat_acked: &AtomicBool,
        ack_deadline: &mut Option<Instant>,
        heartbeat_interval_ms: u64,
    ) -> Result<bool>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if !heartbeat_acked.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let payload = json!({
            "op": GatewayOpcode::Heartbeat as u8,
            "d": self.current_sequence(),
        });

        write
            .send(Message::Text(payload.to_string().into()))
            .await
            .context("send Discord gateway heartbeat")?;

        heartbeat_acked.store(false, Ordering::SeqCst);
        *ack_deadline = Some(Instant::now() + Duration::from_millis(heartbeat_interval_ms));
        Ok(true)
    }

    async fn handle_gateway_message<WsSink>(
        &self,
        message: Message,
        tx: &tokio::sync::mpsc::Sender<GatewayEvent>,
        write: &mut WsSink,
        heartbeat_acked: &AtomicBool,
        ack_deadline: &mut Option<Instant>,
        heartbeat_interval_ms: u64,
    ) -> Result<bool>
    where
        WsSink: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let Some(raw) = websocket_message_to_text(message) else {
            return Ok(true);
        };

        let payload: Value = serde_json::from_str(&raw).context("parse Discord gateway payload")?;

        if let Some(sequence) = payload.get("s").and_then(Value::as_i64) {
            self.state.sequence.store(sequence, Ordering::SeqCst);
        }

        let op = payload
            .get("op")
            .and_then(Value::as_u64)
            .and_then(GatewayOpcode::from_u64);

        match op {
            // Server-requested heartbeats are answered immediately.
            Some(GatewayOpcode::Heartbeat) => {
                self.send_heartbeat_if_healthy(
                    write,
                    heartbeat_acked,
                    ack_deadline,
                    heartbeat_interval_ms,
                )
                .await
            }
            Some(GatewayOpcode::HeartbeatAck) => {
                heartbeat_acked.store(true, Ordering::SeqCst);
                *ack_deadline = None;
                Ok(true)
            }
            Some(GatewayOpcode::Reconnect) => {
                tracing::info!("gateway.reconnect_requested");
                Ok(false)
            }
            Some(GatewayOpcode::InvalidSession) => {
                self.handle_invalid_session(&payload).await;
                Ok(false)
            }
            Some(GatewayOpcode::Dispatch) => {
                self.handle_dispatch_payload(&payload, tx).await?;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn handle_dispatch_payload(
        &self,
        payload: &Value,
        tx: &tokio::sync::mpsc::Sender<GatewayEvent>,
    ) -> Result<()> {
        let event_type = payload.get("t").and_then(Value::as_str).unwrap_or("");
        let Some(data) = payload.get("d") else {
            return Ok(());
        };

        if let Some(event) = parse_dispatch_event(event_type, data) {
            if let GatewayEvent::Ready {
                session_id,
                resume_gateway_url,
                ..
            } = &event
            {
                *self.state.session_id.lock().await = Some(session_id.clone());
                *self.state.resume_gateway_url.lock().await = Some(resume_gateway_url.clone());
            }
            tx.send(event)
                .await
                .context("dispatch parsed Discord gateway event")?;
        }

        Ok(())
    }

    async fn handle_invalid_session(&self, payload: &Value) {
        let can_resume = payload.get("d").and_then(Value::as_bool).unwrap_or(false);

        if can_resume {
            let wait_secs = invalid_session_backoff_secs();
            tracing::warn!(wait_secs, "gateway.invalid_session_resumable");
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
            return;
        }

        tracing::warn!("gateway.invalid_session");
        self.state.sequence.store(-1, Ordering::SeqCst);
        *self.state.session_id.lock().await = None;
        *self.state.resume_gateway_url.lock().await = None;
    }

    fn current_sequence(&self) -> Value {
        let sequence = self.current_sequence_value();
        if sequence < 0 {
            Value::Null
        } else {
            json!(sequence)
        }
    }

    fn current_sequence_value(&self) -> i64 {
        self.state.sequence.load(Ordering::SeqCst)
    }
}

pub fn parse_dispatch_event(event_type: &str, d: &Value) -> Option<GatewayEvent> {
    match event_type {
        "READY" => parse_ready_event(d),
        "INTERACTION_CREATE" => {
            parse_interaction(d).map(|interaction| GatewayEvent::InteractionCreate(Box::new(interaction)))
        }
        "RESUMED" => {
            tracing::info!("gateway.resumed");
            None
        }
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_ready_event(d: &Value) -> Option<GatewayEvent> {
    Some(GatewayEvent::Ready {
        session_id: str_field(d, "session_id")?,
        resume_gateway_url: str_field(d, "resume_gateway_url")?,
        user_id: str_field(d.get("user")?, "id")?,
        application_id: d.get("application").and_then(|app| str_field(app, "id")),
    })
}

/// Parse an `INTERACTION_CREATE` payload.
///
/// Guild interactions carry the user inside `member`, DMs carry `user` at the
/// top level.
pub fn parse_interaction(d: &Value) -> Option<Interaction> {
    let member = d.get("member");
    let user_value = member.and_then(|m| m.get("user")).or_else(|| d.get("user"))?;

    let user = InteractionUser {
        id: str_field(user_value, "id")?,
        username: str_field(user_value, "username").unwrap_or_default(),
        global_name: str_field(user_value, "global_name"),
        nick: member.and_then(|m| str_field(m, "nick")),
        avatar: str_field(user_value, "avatar"),
        guild_avatar: member.and_then(|m| str_field(m, "avatar")),
    };

    let channel_id = str_field(d, "channel_id")
        .or_else(|| d.get("channel").and_then(|channel| str_field(channel, "id")))?;

    Some(Interaction {
        id: str_field(d, "id")?,
        token: str_field(d, "token")?,
        kind: d.get("type")?.as_u64()?,
        application_id: str_field(d, "application_id"),
        channel_id,
        guild_id: str_field(d, "guild_id"),
        user,
        data: d.get("data").cloned().unwrap_or(Value::Null),
    })
}

async fn wait_for_ack_timeout(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    } else {
        futures_util::future::pending::<()>().await;
    }
}

async fn read_hello_heartbeat_interval<WsRead>(read: &mut WsRead) -> Result<u64>
where
    WsRead:
        Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let message = message.context("read Discord gateway hello payload")?;
        let Some(raw) = websocket_message_to_text(message) else {
            continue;
        };

        let payload: Value =
            serde_json::from_str(&raw).context("parse Discord gateway hello JSON")?;
        let op = payload
            .get("op")
            .and_then(Value::as_u64)
            .and_then(GatewayOpcode::from_u64);

        if op == Some(GatewayOpcode::Hello) {
            return Ok(payload
                .get("d")
                .and_then(|d| d.get("heartbeat_interval"))
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS));
        }
    }

    Err(anyhow::anyhow!("Discord gateway closed before Hello"))
}

fn websocket_message_to_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

fn build_gateway_ws_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    format!("{trimmed}/?v=10&encoding=json")
}

/// 1-5 seconds, as Discord asks before re-identifying.
fn invalid_session_backoff_secs() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.subsec_nanos())
        .unwrap_or(0);
    1 + u64::from(nanos % 5)
}
