use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::app::{AppState, Readiness};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub slack_signatures: HealthCheck,
    pub classifier: HealthCheck,
    pub checked_at: String,
}

/// Always 200 while the process serves requests. `degraded` flags a
/// configuration that still works but answers less than it could.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(report(state.readiness))
}

pub fn report(readiness: Readiness) -> HealthResponse {
    let slack_signatures = if readiness.signatures_verified {
        HealthCheck { status: "ready", detail: "signed events required".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "unsigned events accepted (allow_unsigned_events)".to_string(),
        }
    };
    let classifier = if readiness.classifier_configured {
        HealthCheck { status: "ready", detail: "llm intent classification".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "no llm api key; every command gets the clarifying reply".to_string(),
        }
    };
    let ready = slack_signatures.status == "ready" && classifier.status == "ready";

    HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "circuitops-server runtime initialized".to_string(),
        },
        slack_signatures,
        classifier,
        checked_at: Utc::now().to_rfc3339(),
    }
}
