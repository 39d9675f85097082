use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use circuitops_agent::ConciergeService;
use circuitops_core::ratelimit::RateLimiter;
use circuitops_slack::{ChannelNotifier, EventProcessor, SignatureVerifier};
use reqwest::Client;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::{chat, demo, health, slack_events};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
script-src 'self' 'unsafe-inline' 'unsafe-eval' https://www.googletagmanager.com https://www.google-analytics.com; \
img-src 'self' data: https:; \
font-src 'self' https://fonts.googleapis.com https://fonts.gstatic.com; \
style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
connect-src 'self' https://www.google-analytics.com https://www.googletagmanager.com https://api.drivebrandgrowth.com; \
frame-ancestors 'none';";

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("content-security-policy", CONTENT_SECURITY_POLICY),
];

/// What `/health` reports about how the process was configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Readiness {
    pub signatures_verified: bool,
    pub classifier_configured: bool,
}

#[derive(Clone)]
pub struct AppState {
    /// `None` only when unsigned events were explicitly allowed.
    pub verifier: Option<SignatureVerifier>,
    pub events: Arc<EventProcessor>,
    pub event_deadline: Duration,
    pub concierge: Arc<ConciergeService>,
    pub chat_limiter: Arc<RateLimiter>,
    pub notifier: Arc<ChannelNotifier>,
    pub http: Client,
    pub demo_webhook_url: Option<String>,
    pub trust_proxy_headers: bool,
    pub readiness: Readiness,
}

pub fn router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/slack/events", post(slack_events::receive))
        .route("/api/chat", post(chat::respond))
        .route("/api/demo-request", post(demo::submit))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    SECURITY_HEADERS.iter().fold(router, |router, &(name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ))
    })
}
