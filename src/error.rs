//! Proxy error types and HTTP response mapping to the Anthropic error envelope.

use crate::models::anthropic::ErrorEnvelope;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Application-specific errors for the Messages↔OpenAI proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request transformation error: {0}")]
    Transform(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("Upstream connection error: {0}")]
    UpstreamTransport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or invalid credentials")]
    Authentication,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::UpstreamTransport(e.to_string())
    }
}

impl ProxyError {
    /// Maps this error to the `(type, message)` pair used in the Anthropic error
    /// envelope, per the status→kind table in §6/§7 of the spec.
    fn kind_and_message(&self) -> (&'static str, String) {
        match self {
            ProxyError::Config(msg) => ("api_error", msg.clone()),
            ProxyError::Transform(msg) => ("invalid_request_error", msg.clone()),
            ProxyError::InvalidRequest(msg) => ("invalid_request_error", msg.clone()),
            ProxyError::Authentication => {
                ("authentication_error", "Missing or invalid API key".to_string())
            }
            ProxyError::Serialization(e) => ("invalid_request_error", format!("JSON error: {e}")),
            ProxyError::UpstreamTransport(msg) => ("api_error", msg.clone()),
            ProxyError::Internal(msg) => ("api_error", msg.clone()),
            ProxyError::Upstream { status, body } => {
                let kind = kind_for_upstream_status(*status, body);
                (kind, format!("Upstream returned {status}: {body}"))
            }
        }
    }

    /// HTTP status this error is reported to the downstream client with.
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::Config(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Transform(_) | ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Authentication => StatusCode::UNAUTHORIZED,
            ProxyError::Serialization(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Maps an upstream HTTP status (and, for 5xx, a body substring check) to an
/// Anthropic error kind, per spec.md §6.
pub fn kind_for_upstream_status(status: StatusCode, body: &str) -> &'static str {
    match status.as_u16() {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        500..=599 => {
            if body.to_lowercase().contains("overloaded") {
                "overloaded_error"
            } else {
                "api_error"
            }
        }
        _ => "api_error",
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let status = self.status();
        let (kind, message) = self.kind_and_message();
        (status, Json(ErrorEnvelope::new(kind, message))).into_response()
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
