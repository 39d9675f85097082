use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use circuitops_core::errors::ApplicationError;
use circuitops_slack::DemoRequest;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const DEMO_SOURCE: &str = "usecircuitos.com";

#[derive(Debug, Default, Deserialize)]
struct DemoForm {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    vertical: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl DemoForm {
    fn into_request(self) -> Option<DemoRequest> {
        let present = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        Some(DemoRequest {
            name: present(self.name)?,
            email: present(self.email)?,
            company: present(self.company),
            vertical: present(self.vertical),
            message: present(self.message),
        })
    }
}

/// Demo form endpoint. The upstream webhook and the Slack card are best
/// effort; the submission is always logged.
pub async fn submit(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let form: DemoForm = serde_json::from_slice(&body).map_err(|error| {
        ApiError::new(ApplicationError::MalformedInput(error.to_string()), &correlation_id)
            .with_message("Invalid request")
    })?;
    let request = form.into_request().ok_or_else(|| {
        ApiError::new(
            ApplicationError::MalformedInput("name or email missing".to_string()),
            &correlation_id,
        )
        .with_message("Name and email are required")
    })?;

    if let Some(url) = state.demo_webhook_url.as_deref() {
        forward_to_webhook(&state.http, url, &request, &correlation_id).await;
    }

    info!(
        event_name = "ingress.demo.submitted",
        correlation_id = %correlation_id,
        name = %request.name,
        email = %request.email,
        company = request.company.as_deref().unwrap_or("N/A"),
        vertical = request.vertical.as_deref().unwrap_or("N/A"),
        message = request.message.as_deref().unwrap_or("N/A"),
        "demo request received"
    );

    state.notifier.demo_request(&request).await;

    Ok(Json(json!({ "success": true })))
}

/// Upstream automation payload. Missing optionals get display placeholders.
pub fn webhook_payload(request: &DemoRequest, submitted_at: &str) -> Value {
    json!({
        "type": "demo_request",
        "name": request.name,
        "email": request.email,
        "company": request.company.as_deref().unwrap_or("Not provided"),
        "vertical": request.vertical.as_deref().unwrap_or("Not specified"),
        "message": request.message.as_deref().unwrap_or("No message"),
        "source": DEMO_SOURCE,
        "submitted_at": submitted_at,
    })
}

async fn forward_to_webhook(http: &Client, url: &str, request: &DemoRequest, correlation_id: &str) {
    let submitted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let result = http
        .post(url)
        .timeout(WEBHOOK_TIMEOUT)
        .json(&webhook_payload(request, &submitted_at))
        .send()
        .await
        .and_then(|response| response.error_for_status());

    if let Err(error) = result {
        warn!(
            event_name = "egress.demo.webhook_failed",
            correlation_id = %correlation_id,
            error = %error,
            "demo webhook notification failed"
        );
    }
}
