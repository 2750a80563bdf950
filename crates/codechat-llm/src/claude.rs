use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{DEFAULT_TEMPERATURE, LlmProvider, Message, Role};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API. Generation only; pair with an embedding-capable
/// provider for indexing.
#[derive(Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ClaudeProvider {
    #[must_use]
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: crate::http::default_client(),
            api_url: API_URL.to_owned(),
            api_key,
            model,
            max_tokens,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Point the provider at a different Messages endpoint (proxies, tests).
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    async fn send_request(&self, messages: &[Message]) -> Result<String, LlmError> {
        let (system, chat_messages) = split_messages(messages);
        let body = RequestBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: system.as_deref(),
            messages: &chat_messages,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(model = %self.model, "Claude rate limited");
            return Err(LlmError::RateLimited { provider: "claude" });
        }

        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("Claude API error {status}: {text}");
            return Err(LlmError::Status {
                provider: "claude",
                status,
            });
        }

        let resp: ApiResponse = serde_json::from_str(&text)?;
        let answer: String = resp
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if answer.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: "claude" });
        }
        Ok(answer)
    }
}

impl LlmProvider for ClaudeProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.send_request(messages).await
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::EmbedUnsupported { provider: "claude" })
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "claude"
    }
}

fn split_messages(messages: &[Message]) -> (Option<String>, Vec<ApiMessage<'_>>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.as_str()),
            Role::User | Role::Assistant => chat.push(ApiMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, chat)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ApiMessage<'a>],
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider_for(server: &MockServer) -> ClaudeProvider {
        ClaudeProvider::new("sk-ant-test".into(), "claude-sonnet-4".into(), 2000)
            .with_api_url(format!("{}/v1/messages", server.uri()))
    }

    #[test]
    fn split_messages_extracts_system() {
        let messages = vec![
            Message::system("answer from context"),
            Message::user("where is auth?"),
            Message::assistant("in auth.py"),
            Message::user("and tokens?"),
        ];
        let (system, chat) = split_messages(&messages);
        assert_eq!(system.as_deref(), Some("answer from context"));
        assert_eq!(chat.len(), 3);
        assert_eq!(chat[0].role, "user");
        assert_eq!(chat[1].role, "assistant");
    }

    #[test]
    fn split_messages_joins_multiple_system_parts() {
        let messages = vec![Message::system("a"), Message::system("b")];
        let (system, chat) = split_messages(&messages);
        assert_eq!(system.as_deref(), Some("a\n\nb"));
        assert!(chat.is_empty());
    }

    #[test]
    fn request_body_omits_missing_system() {
        let msgs = [ApiMessage {
            role: "user",
            content: "hi",
        }];
        let body = RequestBody {
            model: "m",
            max_tokens: 10,
            temperature: 0.5,
            system: None,
            messages: &msgs,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = ClaudeProvider::new("sk-secret".into(), "m".into(), 100);
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn embed_is_unsupported() {
        let provider = ClaudeProvider::new("k".into(), "m".into(), 100);
        assert!(!provider.supports_embeddings());
        let err = provider.embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { provider: "claude" }));
    }

    #[tokio::test]
    async fn chat_returns_joined_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "Auth lives in "},
                    {"type": "text", "text": "auth.py [S1]."}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = provider_for(&server)
            .chat(&[Message::system("rules"), Message::user("where is auth?")])
            .await
            .unwrap();
        assert_eq!(answer, "Auth lives in auth.py [S1].");
    }

    #[tokio::test]
    async fn chat_sends_configured_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-sonnet-4",
                "max_tokens": 2000,
                "temperature": 0.1,
                "system": "rules"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider_for(&server)
            .chat(&[Message::system("rules"), Message::user("q")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn with_temperature_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"temperature": 0.5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider_for(&server)
            .with_temperature(0.5)
            .chat(&[Message::user("q")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chat_maps_429_to_rate_limited_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { provider: "claude" }));
    }

    #[tokio::test]
    async fn chat_surfaces_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn chat_with_no_text_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .chat(&[Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
