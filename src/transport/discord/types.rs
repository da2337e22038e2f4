//! Discord API constants and type definitions.

/// Discord API base URL (v10).
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Fallback when `/gateway/bot` does not return a URL.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Interactions arrive without any privileged intent; GUILDS is enough.
pub const DEFAULT_INTENTS: u64 = intents::GUILDS;

/// Default heartbeat interval when server does not provide one (ms).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;

/// Discord maximum message length (characters).
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Embed description limit (characters).
pub const MAX_EMBED_DESCRIPTION_LENGTH: usize = 4096;

/// Webhook `username` limit (characters).
pub const MAX_WEBHOOK_USERNAME_LENGTH: usize = 80;

/// Base URL for avatar images.
pub const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Gateway opcodes this client sends or reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatewayOpcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Resume = 6,
    Reconnect = 7,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl GatewayOpcode {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }
}

/// Discord interaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InteractionType {
    Ping = 1,
    ApplicationCommand = 2,
    MessageComponent = 3,
    ApplicationCommandAutocomplete = 4,
    ModalSubmit = 5,
}

impl InteractionType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Ping),
            2 => Some(Self::ApplicationCommand),
            3 => Some(Self::MessageComponent),
            4 => Some(Self::ApplicationCommandAutocomplete),
            5 => Some(Self::ModalSubmit),
            _ => None,
        }
    }
}

/// Interaction callback types for responding to interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InteractionCallbackType {
    /// Respond to an interaction with a message.
    ChannelMessageWithSource = 4,
    /// ACK an interaction and edit a response later (shows "thinking...").
    DeferredChannelMessageWithSource = 5,
    /// For components: ACK an interaction and edit the original message later.
    DeferredUpdateMessage = 6,
    /// For components: edit the message the component was attached to.
    UpdateMessage = 7,
    /// Open a modal form.
    Modal = 9,
}

/// Message flag: only the invoking user can see the message.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Component type ids.
pub mod component {
    pub const ACTION_ROW: u8 = 1;
    pub const BUTTON: u8 = 2;
    pub const TEXT_INPUT: u8 = 4;
}

/// Button styles.
pub mod button_style {
    pub const SUCCESS: u8 = 3;
    pub const DANGER: u8 = 4;
}

/// Text input styles.
pub mod text_input_style {
    pub const PARAGRAPH: u8 = 2;
}

/// Application command type for slash commands.
pub const CHAT_INPUT_COMMAND: u8 = 1;

/// Incoming webhook type, the only kind that can be executed with a token.
pub const INCOMING_WEBHOOK: u64 = 1;

/// Individual intent bit flags.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_WEBHOOKS: u64 = 1 << 5;
}

/// Activity type for bot presence display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivityType {
    Playing = 0,
    Streaming = 1,
    Listening = 2,
    Watching = 3,
    Custom = 4,
    Competing = 5,
}

impl ActivityType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Playing),
            1 => Some(Self::Streaming),
            2 => Some(Self::Listening),
            3 => Some(Self::Watching),
            4 => Some(Self::Custom),
            5 => Some(Self::Competing),
            _ => None,
        }
    }
}
