use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use circuitops_core::errors::ApplicationError;
use circuitops_slack::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use circuitops_slack::WebhookPayload;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Events API endpoint. The handshake is answered before any signature
/// check; event callbacks are acknowledged immediately and processed detached.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let decoded: Value = serde_json::from_slice(&body).map_err(|error| {
        warn!(
            event_name = "ingress.slack.invalid_payload",
            correlation_id = %correlation_id,
            error = %error,
            "slack payload is not valid json"
        );
        ApiError::new(ApplicationError::MalformedInput(error.to_string()), &correlation_id)
            .with_message("Invalid JSON")
    })?;
    let payload = WebhookPayload::from_value(decoded);

    if let WebhookPayload::UrlVerification { challenge } = &payload {
        info!(
            event_name = "ingress.slack.url_verification",
            correlation_id = %correlation_id,
            "answering slack url verification"
        );
        return Ok(Json(json!({ "challenge": challenge })));
    }

    if let Some(verifier) = &state.verifier {
        let timestamp = header_str(&headers, TIMESTAMP_HEADER);
        let signature = header_str(&headers, SIGNATURE_HEADER);
        verifier.verify(timestamp, &body, signature, Utc::now().timestamp()).map_err(|error| {
            warn!(
                event_name = "ingress.slack.signature_rejected",
                correlation_id = %correlation_id,
                error = %error,
                "slack request failed signature verification"
            );
            ApiError::new(ApplicationError::Authentication(error.to_string()), &correlation_id)
        })?;
    }

    match payload {
        WebhookPayload::EventCallback { event: Some(event) } => {
            info!(
                event_name = "ingress.slack.event_received",
                correlation_id = %correlation_id,
                event_type = %event.event_type,
                channel = event.channel.as_deref().unwrap_or("unknown"),
                "slack event accepted"
            );
            state.events.spawn_detached(event, state.event_deadline);
        }
        _ => {
            info!(
                event_name = "ingress.slack.payload_ignored",
                correlation_id = %correlation_id,
                "slack payload carries no event"
            );
        }
    }

    Ok(Json(json!({ "ok": true })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or_default()
}
