use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use circuitops_agent::{ChatReply, ChatTurn, ConciergeError};
use circuitops_core::errors::ApplicationError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Chat widget endpoint: per-address rate limit, then the concierge.
pub async fn respond(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let client = client_address(&headers, state.trust_proxy_headers);

    if !state.chat_limiter.check(&client) {
        info!(
            event_name = "ingress.chat.rate_limited",
            correlation_id = %correlation_id,
            client = %client,
            "chat request rate limited"
        );
        return Err(ApiError::new(ApplicationError::RateLimited(client), &correlation_id));
    }

    let turn: ChatTurn = serde_json::from_slice(&body).map_err(|error| {
        warn!(
            event_name = "ingress.chat.invalid_payload",
            correlation_id = %correlation_id,
            error = %error,
            "chat payload could not be decoded"
        );
        ApiError::new(ApplicationError::MalformedInput(error.to_string()), &correlation_id)
            .with_message("Message is required")
    })?;

    if turn.message.is_empty() {
        return Err(ApiError::new(
            ApplicationError::MalformedInput("message missing".to_string()),
            &correlation_id,
        )
        .with_message("Message is required"));
    }

    match state.concierge.respond(turn).await {
        Ok(reply) => {
            info!(
                event_name = "ingress.chat.answered",
                correlation_id = %correlation_id,
                lead_tier = %reply.lead_tier,
                "chat reply sent"
            );
            Ok(Json(reply))
        }
        Err(ConciergeError::EmptyMessage) => Err(ApiError::new(
            ApplicationError::MalformedInput("message empty after sanitization".to_string()),
            &correlation_id,
        )
        .with_message("Message is empty")),
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`. Proxy headers are only
/// read when the deployment sits behind a trusted proxy.
pub fn client_address(headers: &HeaderMap, trust_proxy_headers: bool) -> String {
    if !trust_proxy_headers {
        return UNKNOWN_CLIENT.to_string();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
