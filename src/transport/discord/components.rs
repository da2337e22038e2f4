//! Modal, preview and confirmation payloads, plus custom id routing.

use serde_json::{Value, json};

use super::types::{
    EPHEMERAL_FLAG, MAX_EMBED_DESCRIPTION_LENGTH, button_style, component, text_input_style,
};
use crate::providers::char_prefix;

pub const COMPOSE_MODAL_ID: &str = "relay:compose";
pub const DRAFT_INPUT_ID: &str = "relay:draft";
pub const SEND_BUTTON_ID: &str = "relay:send";
pub const CANCEL_BUTTON_ID: &str = "relay:cancel";

/// Longest draft the modal accepts.
pub const MAX_DRAFT_LENGTH: usize = 4000;

const PREVIEW_COLOR: u32 = 0x0058_65F2;
const SENT_COLOR: u32 = 0x0057_F287;

/// What a button press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Send,
    Cancel,
}

impl ButtonAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            SEND_BUTTON_ID => Some(Self::Send),
            CANCEL_BUTTON_ID => Some(Self::Cancel),
            _ => None,
        }
    }
}

pub fn custom_id(data: &Value) -> Option<&str> {
    data.get("custom_id").and_then(Value::as_str)
}

/// Modal shown for the slash command (callback type 9 `data`).
pub fn compose_modal() -> Value {
    json!({
        "custom_id": COMPOSE_MODAL_ID,
        "title": "Draft a message",
        "components": [{
            "type": component::ACTION_ROW,
            "components": [{
                "type": component::TEXT_INPUT,
                "custom_id": DRAFT_INPUT_ID,
                "label": "Your message",
                "style": text_input_style::PARAGRAPH,
                "placeholder": "Write it however it comes out. You will see the rewrite before anything is posted.",
                "required": true,
                "min_length": 1,
                "max_length": MAX_DRAFT_LENGTH,
            }],
        }],
    })
}

/// Value of the draft text input from a modal submit payload.
pub fn extract_draft_text(data: &Value) -> Option<String> {
    data.get("components")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|row| row.get("components").and_then(Value::as_array))
        .flatten()
        .find(|input| custom_id(input) == Some(DRAFT_INPUT_ID))
        .and_then(|input| input.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Ephemeral response data for the deferred modal acknowledgement.
pub fn ephemeral_flags() -> Value {
    json!({ "flags": EPHEMERAL_FLAG })
}

fn action_row(buttons: &[(&str, &str, u8)]) -> Value {
    let buttons: Vec<Value> = buttons
        .iter()
        .map(|(id, label, style)| {
            json!({
                "type": component::BUTTON,
                "custom_id": id,
                "label": label,
                "style": style,
            })
        })
        .collect();
    json!({ "type": component::ACTION_ROW, "components": buttons })
}

/// Preview of the rewritten text with Send and Cancel buttons.
const TRUNCATION_MARKER: &str = "\n…";
const PREVIEW_FOOTER: &str = "Only you can see this. Send posts it here under your name.";

pub fn preview_message(rewritten_text: &str) -> Value {
    let total_chars = rewritten_text.chars().count();
    let (description, footer) = if total_chars <= MAX_EMBED_DESCRIPTION_LENGTH {
        (rewritten_text.to_string(), PREVIEW_FOOTER.to_string())
    } else {
        let shown = char_prefix(
            rewritten_text,
            MAX_EMBED_DESCRIPTION_LENGTH - TRUNCATION_MARKER.chars().count(),
        );
        (
            format!("{}{TRUNCATION_MARKER}", shown.trim_end()),
            format!(
                "Preview shortened: {} of {total_chars} characters shown. Send posts the full text.",
                shown.trim_end().chars().count()
            ),
        )
    };

    json!({
        "content": "",
        "embeds": [{
            "title": "Rewritten draft",
            "description": description,
            "color": PREVIEW_COLOR,
            "footer": {"text": footer},
        }],
        "components": [action_row(&[
            (SEND_BUTTON_ID, "Send", button_style::SUCCESS),
            (CANCEL_BUTTON_ID, "Cancel", button_style::DANGER),
        ])],
    })
}

pub fn sent_message(via_fallback: bool) -> Value {
    let description = if via_fallback {
        "Posted in this channel by the bot on your behalf."
    } else {
        "Posted in this channel under your name."
    };
    json!({
        "content": "",
        "embeds": [{"title": "Sent", "description": description, "color": SENT_COLOR}],
        "components": [],
    })
}

pub fn discarded_message() -> Value {
    json!({ "content": "Draft discarded.", "embeds": [], "components": [] })
}

/// `Error: <message>`, replacing whatever the message showed before.
pub fn error_message(message: &str) -> Value {
    json!({
        "content": format!("Error: {message}"),
        "embeds": [],
        "components": [],
    })
}

/// Ephemeral follow-up carrying `Error: <message>`.
pub fn error_followup(message: &str) -> Value {
    json!({
        "content": format!("Error: {message}"),
        "flags": EPHEMERAL_FLAG,
    })
}
