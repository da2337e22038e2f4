use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use rewrite_relay::config::{DiscordConfig, RewriteConfig};
use rewrite_relay::drafts::{Draft, DraftStore};
use rewrite_relay::providers::{AnthropicRewriter, Rewriter};
use rewrite_relay::transport::discord::InteractionHandler;
use rewrite_relay::transport::discord::gateway::{Interaction, InteractionUser};
use rewrite_relay::transport::discord::http_client::DiscordHttpClient;

const USER_ID: &str = "175928847299117063";
const CHANNEL_ID: &str = "555";

struct Harness {
    discord: MockServer,
    provider: MockServer,
    drafts: Arc<DraftStore>,
    handler: InteractionHandler,
}

impl Harness {
    async fn start() -> Self {
        let discord = MockServer::start().await;
        let provider = MockServer::start().await;

        let rewriter: Arc<dyn Rewriter> = Arc::new(AnthropicRewriter::new(&RewriteConfig {
            api_key: Some("sk-ant-test".into()),
            endpoint: format!("{}/v1/messages", provider.uri()),
            timeout_secs: 5,
            ..RewriteConfig::default()
        }));
        let drafts = Arc::new(DraftStore::default());
        let handler = InteractionHandler::new(
            Arc::new(DiscordHttpClient::with_base_url("bot-token", discord.uri())),
            rewriter,
            Arc::clone(&drafts),
            &DiscordConfig::default(),
        );

        Self {
            discord,
            provider,
            drafts,
            handler,
        }
    }

    async fn provider_replies(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.provider)
            .await;
    }

    async fn discord_accepts_everything(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/channels/{CHANNEL_ID}/webhooks")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "wh1", "token": "wh-token", "type": 1})),
            )
            .mount(&self.discord)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/channels/{CHANNEL_ID}/webhooks")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.discord)
            .await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg"})))
            .mount(&self.discord)
            .await;
    }

    async fn discord_requests(&self) -> Vec<Request> {
        self.discord.received_requests().await.unwrap_or_default()
    }
}

fn interaction(kind: u64, channel_id: &str, data: Value) -> Interaction {
    Interaction {
        id: "int".into(),
        token: "int-token".into(),
        kind,
        application_id: Some("app".into()),
        channel_id: channel_id.into(),
        guild_id: Some("guild".into()),
        user: InteractionUser {
            id: USER_ID.into(),
            username: "ada".into(),
            global_name: Some("Ada Lovelace".into()),
            nick: None,
            avatar: Some("hash".into()),
            guild_avatar: None,
        },
        data,
    }
}

fn modal_submit(text: &str) -> Interaction {
    interaction(
        5,
        CHANNEL_ID,
        json!({
            "custom_id": "relay:compose",
            "components": [{
                "type": 1,
                "components": [{"type": 4, "custom_id": "relay:draft", "value": text}]
            }]
        }),
    )
}

fn button(custom_id: &str, channel_id: &str) -> Interaction {
    interaction(3, channel_id, json!({"custom_id": custom_id, "component_type": 2}))
}

fn json_body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

fn find<'a>(requests: &'a [Request], verb: &str, route: &str) -> Vec<&'a Request> {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .collect()
}

#[tokio::test]
async fn compose_preview_then_send_posts_through_webhook() {
    let harness = Harness::start().await;
    harness
        .provider_replies(
            200,
            json!({"content": [{"type": "text", "text": "Hi all, the meeting moved to 3 pm."}]}),
        )
        .await;
    harness.discord_accepts_everything().await;

    harness
        .handler
        .handle(modal_submit("hi all meeting moved 2 3pm"))
        .await;

    let draft = harness.drafts.get(USER_ID).expect("draft stored");
    assert_eq!(draft.rewritten_text, "Hi all, the meeting moved to 3 pm.");
    assert_eq!(draft.origin_channel_id, CHANNEL_ID);

    let requests = harness.discord_requests().await;
    let defer = find(&requests, "POST", "/interactions/int/int-token/callback");
    assert_eq!(defer.len(), 1);
    assert_eq!(json_body(defer[0])["type"], 5);
    assert_eq!(json_body(defer[0])["data"]["flags"], 64);

    let preview = find(&requests, "PATCH", "/webhooks/app/int-token/messages/@original");
    assert_eq!(preview.len(), 1);
    let preview = json_body(preview[0]);
    assert_eq!(
        preview["embeds"][0]["description"],
        "Hi all, the meeting moved to 3 pm."
    );
    assert_eq!(preview["components"][0]["components"][0]["custom_id"], "relay:send");

    harness.handler.handle(button("relay:send", CHANNEL_ID)).await;

    assert!(harness.drafts.get(USER_ID).is_none());
    let requests = harness.discord_requests().await;
    let executed = find(&requests, "POST", "/webhooks/wh1/wh-token");
    assert_eq!(executed.len(), 1);
    let posted = json_body(executed[0]);
    assert_eq!(posted["content"], "Hi all, the meeting moved to 3 pm.");
    assert_eq!(posted["username"], "Ada Lovelace");
    assert_eq!(
        posted["avatar_url"],
        format!("https://cdn.discordapp.com/avatars/{USER_ID}/hash.png")
    );
    assert_eq!(posted["allowed_mentions"]["parse"], json!([]));

    let edits = find(&requests, "PATCH", "/webhooks/app/int-token/messages/@original");
    let confirmation = json_body(edits.last().expect("confirmation edit"));
    assert_eq!(confirmation["embeds"][0]["title"], "Sent");
    assert_eq!(confirmation["components"], json!([]));

    // The original draft text never reaches the channel.
    assert!(
        requests
            .iter()
            .all(|r| !String::from_utf8_lossy(&r.body).contains("moved 2 3pm"))
    );
}

#[tokio::test]
async fn send_from_another_channel_is_rejected_and_draft_kept() {
    let harness = Harness::start().await;
    harness.discord_accepts_everything().await;
    harness
        .drafts
        .put(Draft::new(USER_ID, "Polished text.", CHANNEL_ID));

    harness.handler.handle(button("relay:send", "999")).await;

    assert_eq!(
        harness.drafts.get(USER_ID).map(|d| d.rewritten_text),
        Some("Polished text.".to_string())
    );
    let requests = harness.discord_requests().await;
    assert!(
        requests
            .iter()
            .all(|r| !r.url.path().starts_with("/webhooks/wh1"))
    );
    let followups = find(&requests, "POST", "/webhooks/app/int-token");
    assert_eq!(followups.len(), 1);
    let body = json_body(followups[0]);
    assert_eq!(body["flags"], 64);
    assert!(body["content"].as_str().unwrap_or("").starts_with("Error: "));
}

#[tokio::test]
async fn provider_rejection_is_shown_and_no_draft_created() {
    let harness = Harness::start().await;
    harness
        .provider_replies(400, json!({"error": {"message": "bad request"}}))
        .await;
    harness.discord_accepts_everything().await;

    harness.handler.handle(modal_submit("some draft")).await;

    assert!(harness.drafts.is_empty());
    let requests = harness.discord_requests().await;
    let edits = find(&requests, "PATCH", "/webhooks/app/int-token/messages/@original");
    assert_eq!(edits.len(), 1);
    assert_eq!(
        json_body(edits[0])["content"],
        "Error: the rewrite service rejected the request (HTTP 400): bad request"
    );
}

#[tokio::test]
async fn second_compose_replaces_first_draft() {
    let harness = Harness::start().await;
    harness.discord_accepts_everything().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"content": [{"type": "text", "text": "First."}]})),
        )
        .up_to_n_times(1)
        .mount(&harness.provider)
        .await;
    harness
        .provider_replies(200, json!({"content": [{"type": "text", "text": "Second."}]}))
        .await;

    harness.handler.handle(modal_submit("first")).await;
    harness.handler.handle(modal_submit("second")).await;

    assert_eq!(harness.drafts.len(), 1);
    assert_eq!(
        harness.drafts.get(USER_ID).map(|d| d.rewritten_text),
        Some("Second.".to_string())
    );
}

#[tokio::test]
async fn cancel_posts_nothing() {
    let harness = Harness::start().await;
    harness.discord_accepts_everything().await;
    harness
        .drafts
        .put(Draft::new(USER_ID, "Polished text.", CHANNEL_ID));

    harness.handler.handle(button("relay:cancel", CHANNEL_ID)).await;

    assert!(harness.drafts.is_empty());
    let requests = harness.discord_requests().await;
    assert_eq!(requests.len(), 1);
    let body = json_body(&requests[0]);
    assert_eq!(body["type"], 7);
    assert_eq!(body["data"]["content"], "Draft discarded.");
}
