use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use circuitops_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

/// HTTP face of [`InterfaceError`]. The body carries only the user-safe
/// message; the detailed message stays in logs.
#[derive(Debug)]
pub struct ApiError {
    inner: InterfaceError,
    message: Option<&'static str>,
}

impl ApiError {
    pub fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self { inner: error.into_interface(correlation_id), message: None }
    }

    /// Replaces the generic user message for this status.
    pub fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.inner.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message.unwrap_or_else(|| self.inner.user_message()),
            correlation_id: self.inner.correlation_id(),
        };
        (status, Json(body)).into_response()
    }
}
