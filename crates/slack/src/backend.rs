use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use circuitops_core::config::BackendConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

pub const DASHBOARD_KEY_HEADER: &str = "X-Dashboard-Key";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub dashboard_auth: bool,
    pub timeout: Duration,
}

impl BackendRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
            dashboard_auth: false,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, timeout: Duration) -> Self {
        Self { method: Method::Post, ..Self::get(url, timeout) }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_dashboard_key(mut self) -> Self {
        self.dashboard_auth = true;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("backend response was not json: {0}")]
    Decode(String),
}

/// Outcome of a health probe, rendered the way operators read it in Slack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStatus {
    Up,
    Down(u16),
    Unreachable,
}

impl ProbeStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("UP"),
            Self::Down(status) => write!(f, "DOWN ({status})"),
            Self::Unreachable => f.write_str("DOWN (timeout)"),
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendError>;

    async fn probe(&self, url: &str, timeout: Duration) -> ProbeStatus;
}

pub struct HttpBackend {
    client: Client,
    dashboard_key: Option<SecretString>,
}

impl HttpBackend {
    pub fn new(client: Client, dashboard_key: Option<SecretString>) -> Self {
        Self { client, dashboard_key }
    }
}

fn map_reqwest_error(error: reqwest::Error) -> BackendError {
    if error.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(error.to_string())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if request.dashboard_auth {
            if let Some(key) = &self.dashboard_key {
                builder = builder.header(DASHBOARD_KEY_HEADER, key.expose_secret());
            }
        }
        builder = match (&request.body, request.method) {
            (Some(body), _) => builder.json(body),
            (None, Method::Post) => builder.header(CONTENT_TYPE, "application/json"),
            (None, Method::Get) => builder,
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes).map_err(|error| BackendError::Decode(error.to_string()))
    }

    async fn probe(&self, url: &str, timeout: Duration) -> ProbeStatus {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => ProbeStatus::Up,
            Ok(response) => ProbeStatus::Down(response.status().as_u16()),
            Err(_) => ProbeStatus::Unreachable,
        }
    }
}

/// URL layout of the two backend surfaces: per-vertical COS services and the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    cos_base: String,
    console_base: String,
}

impl Endpoints {
    pub fn new(cos_base: &str, console_base: &str) -> Self {
        Self {
            cos_base: cos_base.trim_end_matches('/').to_string(),
            console_base: console_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(&config.cos_api_base_url, &config.console_api_url)
    }

    /// `{cos}/{vertical}{path}`; `path` starts with `/`. The vertical is
    /// encoded as a single segment.
    pub fn vertical(&self, vertical: &str, path: &str) -> String {
        let vertical = path_segment(vertical).unwrap_or_default();
        format!("{}/{vertical}{path}", self.cos_base)
    }

    pub fn console(&self, path: &str) -> String {
        format!("{}{path}", self.console_base)
    }
}

/// Percent-encodes one path segment taken from chat input, `/` and `%`
/// included. Empty and dot segments have no encoding that keeps the route,
/// so they come back as `None`.
pub fn path_segment(raw: &str) -> Option<String> {
    if matches!(raw, "" | "." | "..") {
        return None;
    }
    let mut url = Url::parse("http://segment.invalid/").ok()?;
    url.path_segments_mut().ok()?.push(raw);
    Some(url.path().trim_start_matches('/').to_string())
}
