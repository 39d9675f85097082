//! Command handlers. Each one turns an action plus params into backend calls
//! and a formatted reply. Backend failures become apology text with no
//! blocks; nothing here returns an error.

pub mod campaigns;
pub mod content;
pub mod help;
pub mod leads;
pub mod status;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circuitops_core::config::BackendConfig;
use circuitops_core::intent::IntentParams;
use serde_json::Value;

use crate::backend::{path_segment, Backend, Endpoints};
use crate::blocks::CommandResult;
use crate::commands::CommandService;

pub const NOT_AVAILABLE: &str = "N/A";

pub struct HandlerContext {
    pub backend: Arc<dyn Backend>,
    pub endpoints: Endpoints,
    pub default_vertical: String,
    pub verticals: Vec<String>,
}

impl HandlerContext {
    pub fn new(backend: Arc<dyn Backend>, config: &BackendConfig) -> Self {
        Self {
            backend,
            endpoints: Endpoints::from_config(config),
            default_vertical: config.default_vertical.clone(),
            verticals: config.verticals.clone(),
        }
    }

    /// The `vertical` param, or the configured default when absent, blank or
    /// a dot segment.
    pub fn vertical(&self, params: &IntentParams) -> String {
        params
            .get("vertical")
            .map(|value| value.trim())
            .filter(|value| path_segment(value).is_some())
            .unwrap_or(self.default_vertical.as_str())
            .to_string()
    }
}

/// Routes each intent family to its handler module.
pub struct HandlerService {
    ctx: HandlerContext,
}

impl HandlerService {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandService for HandlerService {
    async fn status(&self, action: &str, params: &IntentParams) -> CommandResult {
        status::handle(&self.ctx, action, params).await
    }

    async fn content(&self, action: &str, params: &IntentParams) -> CommandResult {
        content::handle(&self.ctx, action, params).await
    }

    async fn leads(&self, action: &str, params: &IntentParams) -> CommandResult {
        leads::handle(&self.ctx, action, params).await
    }

    async fn campaigns(&self, action: &str, params: &IntentParams) -> CommandResult {
        campaigns::handle(&self.ctx, action, params).await
    }

    async fn help(&self) -> CommandResult {
        help::handle(&self.ctx.default_vertical)
    }
}

pub(crate) fn param<'a>(params: &'a IntentParams, key: &str) -> Option<&'a str> {
    params.get(key).map(|value| value.trim()).filter(|value| !value.is_empty())
}

/// An ID param paired with its encoded form for use inside a URL path.
pub(crate) fn id_param<'a>(params: &'a IntentParams, key: &str) -> Option<(&'a str, String)> {
    let id = param(params, key)?;
    Some((id, path_segment(id)?))
}

/// Renders a scalar the way it appears in JSON, or `N/A` when absent or null.
pub(crate) fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_AVAILABLE.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

pub(crate) fn display_str<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value.and_then(Value::as_str).filter(|text| !text.is_empty())
}

pub(crate) fn fixed(value: Option<&Value>, digits: usize) -> String {
    value
        .and_then(Value::as_f64)
        .map(|number| format!("{number:.digits$}"))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Formats a 0..1 ratio as a one-decimal percentage.
pub(crate) fn percent(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_f64)
        .map(|ratio| format!("{:.1}%", ratio * 100.0))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Accepts either a bare array or an object wrapping one under `key`.
pub(crate) fn list_payload<'a>(payload: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    payload.get(key).and_then(Value::as_array).or_else(|| payload.as_array())
}

pub(crate) fn checked_at(now: DateTime<Utc>) -> String {
    now.format("%b %-d, %Y %-I:%M %p UTC").to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use circuitops_core::config::AppConfig;
    use circuitops_core::intent::IntentParams;
    use serde_json::Value;

    use super::HandlerContext;
    use crate::backend::{Backend, BackendError, BackendRequest, ProbeStatus};

    /// Backend double: replays queued responses and records every request.
    #[derive(Default)]
    pub struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<Value, BackendError>>>,
        probes: Mutex<Vec<(String, ProbeStatus)>>,
        requests: Mutex<Vec<BackendRequest>>,
    }

    impl ScriptedBackend {
        pub fn replying(responses: Vec<Result<Value, BackendError>>) -> Arc<Self> {
            Arc::new(Self { responses: Mutex::new(responses.into()), ..Self::default() })
        }

        pub fn with_probe(self: Arc<Self>, url_suffix: &str, status: ProbeStatus) -> Arc<Self> {
            self.probes.lock().expect("probes lock").push((url_suffix.to_string(), status));
            self
        }

        pub fn requests(&self) -> Vec<BackendRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn send(&self, request: BackendRequest) -> Result<Value, BackendError> {
            self.requests.lock().expect("requests lock").push(request);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or(Err(BackendError::Status(500)))
        }

        async fn probe(&self, url: &str, _timeout: Duration) -> ProbeStatus {
            self.probes
                .lock()
                .expect("probes lock")
                .iter()
                .find(|(suffix, _)| url.ends_with(suffix.as_str()))
                .map(|(_, status)| *status)
                .unwrap_or(ProbeStatus::Up)
        }
    }

    pub fn context(backend: Arc<ScriptedBackend>) -> HandlerContext {
        HandlerContext::new(backend, &AppConfig::default().backend)
    }

    pub fn params(pairs: &[(&str, &str)]) -> IntentParams {
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
    }
}
