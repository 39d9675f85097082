use std::time::Duration;

use async_trait::async_trait;
use circuitops_core::config::SlackConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::blocks::OutboundReply;

pub const POST_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("slack request timed out")]
    Timeout,
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack returned status {0}")]
    Status(u16),
    #[error("slack rejected message: {0}")]
    Api(String),
}

/// Posts one message per call. Failures are reported, never retried.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, reply: &OutboundReply) -> Result<(), ReplyError>;
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackWebClient {
    http: Client,
    bot_token: SecretString,
    api_base_url: String,
}

impl SlackWebClient {
    pub fn new(http: Client, bot_token: SecretString, api_base_url: &str) -> Self {
        Self { http, bot_token, api_base_url: api_base_url.trim_end_matches('/').to_string() }
    }

    pub fn from_config(http: Client, config: &SlackConfig) -> Self {
        Self::new(http, config.bot_token.clone(), &config.api_base_url)
    }
}

#[async_trait]
impl ReplySender for SlackWebClient {
    async fn send(&self, reply: &OutboundReply) -> Result<(), ReplyError> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .timeout(POST_MESSAGE_TIMEOUT)
            .json(reply)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    ReplyError::Timeout
                } else {
                    ReplyError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplyError::Status(status.as_u16()));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|error| ReplyError::Transport(error.to_string()))?;
        if body.ok {
            Ok(())
        } else {
            Err(ReplyError::Api(body.error.unwrap_or_else(|| "unknown_error".to_string())))
        }
    }
}
