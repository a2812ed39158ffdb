//! Server errors and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_realtime::RealtimeError;
use serde_json::json;
use thiserror::Error;

/// Errors raised while starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

/// An engine error rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub RealtimeError);

impl From<RealtimeError> for ApiError {
    fn from(e: RealtimeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RealtimeError::AuthenticationFailure(_) => StatusCode::UNAUTHORIZED,
            RealtimeError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            RealtimeError::NotFound(_) => StatusCode::NOT_FOUND,
            RealtimeError::InvalidMessage(_) | RealtimeError::Core(_) => StatusCode::BAD_REQUEST,
            RealtimeError::EngineStopped | RealtimeError::ConnectionLimit(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RealtimeError::InvalidTransition { .. } | RealtimeError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "code": self.0.error_kind(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
