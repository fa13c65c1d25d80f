//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::ServerError;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub requires_reconnect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ServerError {
    /// HTTP status and machine-readable code.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotConnected { .. } => (StatusCode::UNAUTHORIZED, "not_connected"),
            Self::ReauthRequired { .. } => (StatusCode::UNAUTHORIZED, "reauth_required"),
            Self::RefreshFailed { .. } => (StatusCode::BAD_GATEWAY, "refresh_failed"),
            Self::ExternalService(_) => (StatusCode::BAD_GATEWAY, "external_service_error"),
            Self::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Store(_) | Self::Config { .. } | Self::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: code,
            message,
            requires_reconnect: self.requires_reconnect(),
            provider: self.provider().map(|p| p.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
