use std::time::Duration;

use async_trait::async_trait;
use circuitops_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One request to the hosted model: a system instruction plus the turn history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model api key is not configured")]
    MissingApiKey,
    #[error("language model request timed out")]
    Timeout,
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("language model returned status {status}")]
    Status { status: u16 },
    #[error("language model response could not be decoded: {0}")]
    Decode(String),
    #[error("language model response contained no text")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// False when requests are guaranteed to fail before reaching the network.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_version: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(client: Client, config: &LlmConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let response = self
            .client
            .post(self.messages_url())
            .timeout(self.timeout)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16() });
        }

        let payload: MessagesResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Decode(error.to_string())
            }
        })?;

        payload
            .content
            .into_iter()
            .find(|block| block.kind == "text" || block.kind.is_empty())
            .and_then(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use circuitops_core::config::AppConfig;
    use reqwest::Client;
    use serde_json::{json, Value};

    use super::{AnthropicClient, ChatMessage, CompletionRequest, LlmClient, LlmError};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            max_tokens: 200,
            system: "be brief".to_string(),
            messages: vec![ChatMessage::user("hello")],
        }
    }

    async fn serve(router: Router) -> String {
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(error) => panic!("bind stub listener: {error}"),
        };
        let address = match listener.local_addr() {
            Ok(address) => address,
            Err(error) => panic!("stub listener address: {error}"),
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_network() {
        let mut config = AppConfig::default().llm;
        config.base_url = "http://127.0.0.1:9".to_string();
        let client = AnthropicClient::new(Client::new(), &config);

        assert!(!client.is_configured());
        assert!(matches!(client.complete(request()).await, Err(LlmError::MissingApiKey)));
    }

    #[tokio::test]
    async fn sends_headers_and_returns_first_text_block() {
        let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let router = Router::new().route(
            "/v1/messages",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = recorder.clone();
                async move {
                    let key = headers
                        .get("x-api-key")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if let Ok(mut calls) = recorder.lock() {
                        calls.push((key, body));
                    }
                    Json(json!({"content": [{"type": "text", "text": "{\"intent\":\"help\"}"}]}))
                }
            }),
        );
        let base_url = serve(router).await;

        let mut config = AppConfig::default().llm;
        config.base_url = base_url;
        config.api_key = Some("sk-test".to_string().into());
        let client = AnthropicClient::new(Client::new(), &config);

        let text = client.complete(request()).await.expect("completion should succeed");
        assert_eq!(text, "{\"intent\":\"help\"}");

        let calls = seen.lock().expect("recorder lock").clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sk-test");
        assert_eq!(calls[0].1["model"], "test-model");
        assert_eq!(calls[0].1["max_tokens"], 200);
        assert_eq!(calls[0].1["system"], "be brief");
        assert_eq!(calls[0].1["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let base_url = serve(router).await;

        let mut config = AppConfig::default().llm;
        config.base_url = base_url;
        config.api_key = Some("sk-test".to_string().into());
        let client = AnthropicClient::new(Client::new(), &config);

        assert!(matches!(
            client.complete(request()).await,
            Err(LlmError::Status { status: 503 })
        ));
    }
}
