//! HTTP surface (C7): `GET /health` and `POST /v1/messages`. Parses the
//! downstream Anthropic-shaped request, extracts the caller's own credential,
//! and hands everything to the dispatcher — this module owns no translation
//! logic itself, only request/response plumbing and auth extraction.

use crate::config::Config;
use crate::client::UpstreamClient;
use crate::dispatcher;
use crate::error::{ProxyError, ProxyResult};
use crate::models::anthropic::{self, ErrorEnvelope};
use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// SSE headers built once for streaming responses.
static SSE_HEADERS: OnceLock<HeaderMap> = OnceLock::new();

fn sse_header_map() -> &'static HeaderMap {
    SSE_HEADERS.get_or_init(|| {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", HeaderValue::from_static("text/event-stream"));
        h.insert("Cache-Control", HeaderValue::from_static("no-cache"));
        h.insert("Connection", HeaderValue::from_static("keep-alive"));
        h
    })
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    supports_responses: bool,
    retry_on_not_chat_model: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    proxy: &'static str,
    version: &'static str,
    capabilities: Capabilities,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        proxy: "model-router",
        version: env!("CARGO_PKG_VERSION"),
        capabilities: Capabilities { supports_responses: true, retry_on_not_chat_model: true },
    })
}

/// Pulls the caller's own credential out of the request, per spec.md §4.5: a
/// `x-api-key` header (the Anthropic SDK convention) takes precedence over a
/// bearer `Authorization` header; if neither is present, the proxy's
/// configured fallback key is used; if there is no fallback either, the
/// request is rejected before any upstream call is attempted.
fn extract_bearer_token(headers: &HeaderMap, config: &Config) -> ProxyResult<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }
    config.api_key.clone().ok_or(ProxyError::Authentication)
}

/// Entrypoint for `POST /v1/messages`. The body extractor is `Result<Json<_>,
/// JsonRejection>` rather than a bare `Json<_>` so a malformed body produces
/// the Anthropic error envelope (spec.md §7 layer 1) instead of axum's plain
/// rejection response.
pub async fn messages_handler(
    Extension(config): Extension<Arc<Config>>,
    Extension(upstream): Extension<UpstreamClient>,
    headers: HeaderMap,
    body: Result<Json<anthropic::AnthropicRequest>, JsonRejection>,
) -> ProxyResult<Response> {
    let Json(req) = body.map_err(|rejection| ProxyError::InvalidRequest(rejection.to_string()))?;
    let bearer_token = extract_bearer_token(&headers, &config)?;
    let is_streaming = req.stream.unwrap_or(false);
    tracing::debug!(model = %req.model, streaming = is_streaming, "received request");

    if config.verbose {
        tracing::trace!(request = %serde_json::to_string_pretty(&req).unwrap_or_default(), "incoming request");
    }

    if is_streaming {
        let sse_stream = dispatcher::dispatch_streaming(config.as_ref().clone(), upstream, bearer_token, req).await?;
        Ok((sse_header_map().clone(), Body::from_stream(sse_stream)).into_response())
    } else {
        let anthropic_resp = dispatcher::dispatch_non_streaming(&config, &upstream, &bearer_token, &req).await?;

        if config.verbose {
            tracing::trace!(response = %serde_json::to_string_pretty(&anthropic_resp).unwrap_or_default(), "outgoing response");
        }

        Ok(Json(anthropic_resp).into_response())
    }
}

/// Fallback for any route the router doesn't recognize.
pub async fn not_found_handler() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorEnvelope::new("not_found_error", "No such route"))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_api_key_header_takes_precedence_over_authorization() {
        let config = Config::for_tests();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("key-from-header"));
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer key-from-bearer"));
        assert_eq!(extract_bearer_token(&headers, &config).unwrap(), "key-from-header");
    }

    #[test]
    fn bearer_token_used_when_no_x_api_key() {
        let config = Config::for_tests();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer client-token"));
        assert_eq!(extract_bearer_token(&headers, &config).unwrap(), "client-token");
    }

    #[test]
    fn falls_back_to_configured_key_when_no_client_credential() {
        let mut config = Config::for_tests();
        config.api_key = Some("fallback-key".to_string());
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers, &config).unwrap(), "fallback-key");
    }

    #[test]
    fn missing_credential_and_fallback_is_an_error() {
        let config = Config::for_tests();
        let headers = HeaderMap::new();
        assert!(matches!(extract_bearer_token(&headers, &config), Err(ProxyError::Authentication)));
    }
}
