//! Upstream Client (C5): thin wrapper around a pair of [`reqwest::Client`]s for
//! calling the configured OpenAI-compatible backend, buffered or streamed.
//!
//! Grounded on the teacher's `build_upstream_request`/`require_success` pair in
//! `proxy.rs`, generalized to forward the downstream client's own bearer token
//! (spec.md §4.5) instead of only the proxy-wide fallback key, and split out of
//! the handler so the dispatcher can call it for either API flavor. Follows
//! `electricessence-claw-router`'s `OpenAIAdapter` split between a buffered
//! client (request-level timeout) and a streaming client with none, since a
//! request-level timeout also bounds reading the response body — spec.md §4.5
//! requires read timeouts to stay disabled for the lifetime of an SSE stream.

use crate::error::{ProxyError, ProxyResult};
use bytes::Bytes;
use futures::stream::Stream;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Timeout for a buffered (non-streaming) upstream call, covering the whole
/// request including reading the response body.
const BUFFERED_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// Buffered requests — bounded by `BUFFERED_TIMEOUT_SECS` end to end.
    http: Client,
    /// Streaming requests — no request-level timeout, since the body arrives
    /// incrementally over the life of the SSE stream. The connect phase is
    /// still bounded by the client's own `connect_timeout`, if any.
    stream_http: Client,
}

impl UpstreamClient {
    pub fn new(http: Client) -> Self {
        Self { http, stream_http: Client::new() }
    }

    fn authorize(builder: reqwest::RequestBuilder, bearer_token: &str) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {bearer_token}"))
    }

    /// Sends `body` to `url` and returns the parsed JSON response. `bearer_token`
    /// is the credential to forward upstream: the downstream client's own token
    /// when present, otherwise the proxy's configured fallback key.
    pub async fn post_json<Req: Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        bearer_token: &str,
        body: &Req,
    ) -> ProxyResult<Resp> {
        let response = Self::authorize(self.http.post(url).json(body), bearer_token)
            .timeout(Duration::from_secs(BUFFERED_TIMEOUT_SECS))
            .send()
            .await?;
        let response = require_success(response).await?;
        response.json::<Resp>().await.map_err(ProxyError::from)
    }

    /// Sends `body` to `url` and returns the raw byte stream of the (assumed
    /// SSE) response body, once the upstream has confirmed a success status.
    /// No request-level timeout is applied — an SSE stream can legitimately
    /// run far longer than any buffered call without making progress.
    pub async fn post_stream<Req: Serialize>(
        &self,
        url: &str,
        bearer_token: &str,
        body: &Req,
    ) -> ProxyResult<impl Stream<Item = Result<Bytes, reqwest::Error>>> {
        let response = Self::authorize(self.stream_http.post(url).json(body), bearer_token).send().await?;
        let response = require_success(response).await?;
        Ok(response.bytes_stream())
    }
}

/// Ensures `response` is a success; otherwise reads the body and returns a
/// `ProxyError::Upstream` carrying both the status and body for the
/// dispatcher's fallback-retry check and the client-facing error envelope.
async fn require_success(response: reqwest::Response) -> ProxyResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
    tracing::warn!(%status, %body, "upstream returned error status");
    Err(ProxyError::Upstream { status, body })
}
