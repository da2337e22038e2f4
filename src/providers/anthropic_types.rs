use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct MessagesRequest {
    pub(super) model: String,
    pub(super) max_tokens: u32,
    pub(super) messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub(super) struct Message {
    pub(super) role: &'static str,
    pub(super) content: String,
}

/// Success body. Unknown block types and extra fields are ignored.
#[derive(Debug, Deserialize)]
pub(super) struct MessagesResponse {
    #[serde(default)]
    pub(super) content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponseContentBlock {
    #[serde(rename = "type", default)]
    pub(super) kind: String,
    #[serde(default)]
    pub(super) text: Option<String>,
}

impl ResponseContentBlock {
    pub(super) fn plain_text(&self) -> Option<&str> {
        (self.kind == "text").then_some(self.text.as_deref()).flatten()
    }
}
