use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};

use super::anthropic_types::{Message, MessagesRequest, MessagesResponse};
use super::http_client::build_provider_client_with_timeout;
use super::scrub::{char_prefix, scrub_secret_patterns};
use super::traits::{RewriteRequest, RewriteResult, Rewriter};
use crate::config::RewriteConfig;
use crate::error::RewriteError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How much raw body text is kept when a response cannot be used.
const RAW_PREFIX_CHARS: usize = 300;

const REWRITE_INSTRUCTIONS: &str = "Rewrite the message below so it is clearer and easier to read. \
Keep its meaning, facts, names, numbers and tone exactly as they are; do not add or remove information. \
Reply with the rewritten message only: no preamble, no quotes, no explanation.";

/// Rewrite provider backed by the Anthropic Messages API.
pub struct AnthropicRewriter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            client: build_provider_client_with_timeout(config.timeout_secs),
            endpoint: config.endpoint.clone(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_prompt(original_text: &str) -> String {
        format!("{REWRITE_INSTRUCTIONS}\n\nMessage:\n{original_text}")
    }

    fn build_request(&self, request: &RewriteRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: Self::build_prompt(request.text()),
            }],
        }
    }

    /// Issue exactly one provider call for `original_text`.
    ///
    /// Input and credential checks happen before any network I/O. The
    /// timeout covers sending and reading the whole body; on expiry the
    /// request future is dropped, which aborts the connection.
    pub async fn rewrite_text(&self, original_text: &str) -> Result<RewriteResult, RewriteError> {
        let request = RewriteRequest::new(original_text)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RewriteError::MissingCredential)?;
        let body = self.build_request(&request);

        let started = Instant::now();
        let (status, raw) = tokio::time::timeout(self.timeout, self.send(api_key, &body))
            .await
            .map_err(|_| {
                tracing::warn!(
                    model = %self.model,
                    timeout_secs = self.timeout.as_secs(),
                    "rewrite.timeout"
                );
                self.timeout_error()
            })??;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // Parse failures are kept as raw text until the status is known.
        let parsed = serde_json::from_str::<serde_json::Value>(&raw).ok();

        if !status.is_success() {
            let err = provider_error(status, parsed.as_ref(), &raw);
            tracing::warn!(status = status.as_u16(), elapsed_ms, "rewrite.provider_error");
            return Err(err);
        }

        let result = parsed
            .and_then(|value| serde_json::from_value::<MessagesResponse>(value).ok())
            .and_then(|response| RewriteResult::new(joined_text(&response)))
            .ok_or_else(|| RewriteError::MalformedResponse {
                raw_prefix: scrub_secret_patterns(char_prefix(&raw, RAW_PREFIX_CHARS))
                    .into_owned(),
            })?;

        tracing::info!(
            model = %self.model,
            input_chars = request.text().chars().count(),
            output_chars = result.text().chars().count(),
            elapsed_ms,
            "rewrite.complete"
        );
        Ok(result)
    }

    async fn send(
        &self,
        api_key: &str,
        body: &MessagesRequest,
    ) -> Result<(StatusCode, String), RewriteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Ok((status, raw))
    }

    fn timeout_error(&self) -> RewriteError {
        RewriteError::Timeout {
            timeout_secs: self.timeout.as_secs(),
        }
    }

    fn transport_error(&self, err: &reqwest::Error) -> RewriteError {
        if err.is_timeout() {
            return self.timeout_error();
        }
        RewriteError::Transport(scrub_secret_patterns(&err.to_string()).into_owned())
    }
}

impl Rewriter for AnthropicRewriter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn rewrite<'a>(
        &'a self,
        original_text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RewriteResult, RewriteError>> + Send + 'a>> {
        Box::pin(self.rewrite_text(original_text))
    }
}

/// Newline-joined text of every `type: "text"` block, in order, trimmed.
fn joined_text(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|block| block.plain_text())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn provider_error(
    status: StatusCode,
    parsed: Option<&serde_json::Value>,
    raw: &str,
) -> RewriteError {
    let message = parsed
        .and_then(error_message)
        .map(str::to_string)
        .or_else(|| {
            let prefix = char_prefix(raw.trim(), RAW_PREFIX_CHARS);
            (!prefix.is_empty()).then(|| prefix.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    RewriteError::Provider {
        status: status.as_u16(),
        message: scrub_secret_patterns(&message).into_owned(),
    }
}

/// `error.message`, then top-level `message`, then a bare string `error`.
fn error_message(body: &serde_json::Value) -> Option<&str> {
    fn non_empty(value: Option<&serde_json::Value>) -> Option<&str> {
        value
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    non_empty(body.get("error").and_then(|error| error.get("message")))
        .or_else(|| non_empty(body.get("message")))
        .or_else(|| non_empty(body.get("error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> RewriteConfig {
        RewriteConfig {
            api_key: Some("sk-ant-test".into()),
            model: "claude-test".into(),
            endpoint: format!("{}/v1/messages", server.uri()),
            max_tokens: 400,
            timeout_secs: 2,
        }
    }

    async fn mount_reply(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn api_key_is_trimmed_and_blank_keys_dropped() {
        let mut cfg = RewriteConfig {
            api_key: Some("  sk-ant-abc  ".into()),
            ..RewriteConfig::default()
        };
        assert_eq!(
            AnthropicRewriter::new(&cfg).api_key.as_deref(),
            Some("sk-ant-abc")
        );

        cfg.api_key = Some("   ".into());
        assert!(AnthropicRewriter::new(&cfg).api_key.is_none());
    }

    #[test]
    fn request_serializes_expected_shape() {
        let rewriter = AnthropicRewriter::new(&RewriteConfig {
            model: "claude-test".into(),
            ..RewriteConfig::default()
        });
        let request = RewriteRequest::new("hi all, meeting moved to 3").unwrap();
        let json = serde_json::to_value(rewriter.build_request(&request)).unwrap();

        assert_eq!(json["model"], "claude-test");
        assert_eq!(json["max_tokens"], 400);
        assert_eq!(json["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["messages"][0]["role"], "user");
        let prompt = json["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.starts_with(REWRITE_INSTRUCTIONS));
        assert!(prompt.ends_with("hi all, meeting moved to 3"));
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn error_message_prefers_nested_error() {
        let body = json!({"error": {"message": "nested"}, "message": "top"});
        assert_eq!(error_message(&body), Some("nested"));
        let body = json!({"message": "top"});
        assert_eq!(error_message(&body), Some("top"));
        let body = json!({"error": "plain"});
        assert_eq!(error_message(&body), Some("plain"));
        let body = json!({"error": {"type": "overloaded"}});
        assert_eq!(error_message(&body), None);
    }

    #[test]
    fn provider_error_falls_back_to_raw_prefix_then_status() {
        let long_body = "x".repeat(500);
        let err = provider_error(StatusCode::BAD_GATEWAY, None, &long_body);
        assert!(matches!(
            err,
            RewriteError::Provider { status: 502, ref message } if message.chars().count() == 300
        ));

        let err = provider_error(StatusCode::SERVICE_UNAVAILABLE, None, "   ");
        assert!(matches!(
            err,
            RewriteError::Provider { status: 503, ref message } if message == "HTTP 503"
        ));
    }

    #[tokio::test]
    async fn success_joins_text_blocks_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "  First line"},
                    {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                    {"type": "text", "text": "Second line  \n"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let result = rewriter.rewrite_text("draft").await.unwrap();
        assert_eq!(result.text(), "First line\nSecond line");
    }

    #[tokio::test]
    async fn request_body_matches_contract() {
        let server = MockServer::start().await;
        let expected = json!({
            "model": "claude-test",
            "max_tokens": 400,
            "messages": [{
                "role": "user",
                "content": AnthropicRewriter::build_prompt("pls fix"),
            }],
        });
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_json(expected))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": [{"type": "text", "text": "Please fix."}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        assert_eq!(
            rewriter.rewrite_text("  pls fix ").await.unwrap().text(),
            "Please fix."
        );
    }

    #[tokio::test]
    async fn empty_input_fails_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let err = rewriter.rewrite_text("").await.unwrap_err();
        assert!(matches!(err, RewriteError::InvalidInput));
        server.verify().await;
    }

    #[tokio::test]
    async fn missing_credential_fails_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.api_key = None;
        let rewriter = AnthropicRewriter::new(&cfg);
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(err, RewriteError::MissingCredential));
        server.verify().await;
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": [{"type": "text", "text": "late"}]}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut cfg = config_for(&server);
        cfg.timeout_secs = 1;
        let rewriter = AnthropicRewriter::new(&cfg);

        let started = Instant::now();
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(err, RewriteError::Timeout { timeout_secs: 1 }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn empty_content_is_malformed() {
        let server = MockServer::start().await;
        mount_reply(&server, 200, json!({"content": []})).await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(
            err,
            RewriteError::MalformedResponse { ref raw_prefix } if raw_prefix.contains("content")
        ));
    }

    #[tokio::test]
    async fn non_json_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(
            err,
            RewriteError::MalformedResponse { ref raw_prefix } if raw_prefix == "<html>oops</html>"
        ));
    }

    #[tokio::test]
    async fn blank_text_blocks_are_malformed() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            200,
            json!({"content": [{"type": "text", "text": "  \n "}]}),
        )
        .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        assert!(matches!(
            rewriter.rewrite_text("hello").await.unwrap_err(),
            RewriteError::MalformedResponse { .. }
        ));
    }

    #[tokio::test]
    async fn bad_request_surfaces_provider_message() {
        let server = MockServer::start().await;
        mount_reply(&server, 400, json!({"error": {"message": "bad request"}})).await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(
            err,
            RewriteError::Provider { status: 400, ref message } if message == "bad request"
        ));
    }

    #[tokio::test]
    async fn plain_text_error_body_is_used_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("Overloaded"))
            .mount(&server)
            .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(
            err,
            RewriteError::Provider { status: 529, ref message } if message == "Overloaded"
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let cfg = RewriteConfig {
            api_key: Some("sk-ant-test".into()),
            endpoint: "http://127.0.0.1:1/v1/messages".into(),
            timeout_secs: 2,
            ..RewriteConfig::default()
        };
        let rewriter = AnthropicRewriter::new(&cfg);
        let err = rewriter.rewrite_text("hello").await.unwrap_err();
        assert!(matches!(err, RewriteError::Transport(_)));
    }

    #[tokio::test]
    async fn identical_input_yields_identical_results() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            200,
            json!({"content": [{"type": "text", "text": "Same answer."}]}),
        )
        .await;

        let rewriter = AnthropicRewriter::new(&config_for(&server));
        let first = rewriter.rewrite("same input").await.unwrap();
        let second = rewriter.rewrite("same input").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rewriter.name(), "anthropic");
    }
}
