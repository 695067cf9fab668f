//! Request Dispatcher (C6): wires the router, translators, and upstream client
//! together, and owns the one-shot API-flavor fallback (spec.md §4.6) — a
//! model misclassified by [`crate::router::classify`] fails upstream with a
//! "wrong endpoint" error on the first attempt, so the dispatcher retries once
//! against the other flavor before giving up.

use crate::client::UpstreamClient;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::models::anthropic::{AnthropicRequest, AnthropicResponse, StreamEvent};
use crate::router::{self, ApiFlavor};
use crate::stream::{assembly::BlockAssembler, chat as stream_chat, responses as stream_responses, sse_frame};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};

/// Substrings upstream APIs use to reject a request sent to the wrong
/// endpoint. Checked case-insensitively against the error body (spec.md §4.6).
const WRONG_ENDPOINT_MARKERS: &[&str] = &[
    "not a chat model",
    "must use the responses api",
    "not supported in v1/chat/completions",
    "unsupported_endpoint",
];

fn looks_like_wrong_endpoint(body: &str) -> bool {
    let body = body.to_lowercase();
    WRONG_ENDPOINT_MARKERS.iter().any(|marker| body.contains(marker))
}

fn target_url<'a>(config: &'a Config, flavor: ApiFlavor) -> &'a str {
    match flavor {
        ApiFlavor::Chat => config.chat_completions_url(),
        ApiFlavor::Responses => config.responses_url(),
    }
}

fn resolved_model(config: &Config, requested: &str) -> String {
    config.default_model_override.clone().unwrap_or_else(|| requested.to_string())
}

/// Runs `attempt` against `flavor`; on a wrong-endpoint upstream rejection,
/// retries exactly once against the other flavor. Any other error, or a
/// second failure, is returned as-is.
async fn with_fallback<T, F, Fut>(flavor: ApiFlavor, attempt: F) -> ProxyResult<(ApiFlavor, T)>
where
    F: Fn(ApiFlavor) -> Fut,
    Fut: std::future::Future<Output = ProxyResult<T>>,
{
    match attempt(flavor).await {
        Ok(value) => Ok((flavor, value)),
        Err(ProxyError::Upstream { status, body }) if looks_like_wrong_endpoint(&body) => {
            let fallback = flavor.other();
            tracing::info!(?flavor, ?fallback, "retrying request against fallback API flavor");
            match attempt(fallback).await {
                Ok(value) => Ok((fallback, value)),
                Err(err) => Err(err),
            }
        }
        Err(other) => Err(other),
    }
}

pub async fn dispatch_non_streaming(
    config: &Config,
    upstream: &UpstreamClient,
    bearer_token: &str,
    req: &AnthropicRequest,
) -> ProxyResult<AnthropicResponse> {
    let model = resolved_model(config, &req.model);
    let flavor = router::classify(&model, config);

    let (_, anthropic_resp) = with_fallback(flavor, move |flavor| {
        let model = model.clone();
        async move { call_non_streaming(config, upstream, bearer_token, req, flavor, &model).await }
    })
    .await?;

    Ok(anthropic_resp)
}

async fn call_non_streaming(
    config: &Config,
    upstream: &UpstreamClient,
    bearer_token: &str,
    req: &AnthropicRequest,
    flavor: ApiFlavor,
    model: &str,
) -> ProxyResult<AnthropicResponse> {
    let url = target_url(config, flavor);
    match flavor {
        ApiFlavor::Chat => {
            let chat_req = crate::transform::chat::to_chat_completions(req, model)?;
            let resp = upstream.post_json(url, bearer_token, &chat_req).await?;
            crate::transform::chat::chat_to_anthropic(resp)
        }
        ApiFlavor::Responses => {
            let responses_req = crate::transform::responses::to_responses(req, model)?;
            let resp = upstream.post_json(url, bearer_token, &responses_req).await?;
            crate::transform::responses::responses_to_anthropic(resp)
        }
    }
}

/// Dispatches a streaming request and returns the Anthropic-shaped SSE byte
/// stream. The fallback retry happens before any bytes are handed back to the
/// caller, since a wrong-endpoint rejection always surfaces as a non-2xx
/// response before the upstream would start sending SSE frames.
pub async fn dispatch_streaming(
    config: Config,
    upstream: UpstreamClient,
    bearer_token: String,
    req: AnthropicRequest,
) -> ProxyResult<impl Stream<Item = Result<Bytes, std::io::Error>>> {
    let model = resolved_model(&config, &req.model);
    let flavor = router::classify(&model, &config);

    let (chosen, raw_stream) = with_fallback(flavor, move |flavor| {
        let config = config.clone();
        let upstream = upstream.clone();
        let bearer_token = bearer_token.clone();
        let req = req.clone();
        let model = model.clone();
        async move { open_upstream_stream(&config, &upstream, &bearer_token, &req, flavor, &model).await }
    })
    .await?;

    Ok(assemble_sse_stream(chosen, raw_stream))
}

async fn open_upstream_stream(
    config: &Config,
    upstream: &UpstreamClient,
    bearer_token: &str,
    req: &AnthropicRequest,
    flavor: ApiFlavor,
    model: &str,
) -> ProxyResult<std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>> {
    let url = target_url(config, flavor);
    let boxed: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>> = match flavor {
        ApiFlavor::Chat => {
            let chat_req = crate::transform::chat::to_chat_completions(req, model)?;
            Box::pin(upstream.post_stream(url, bearer_token, &chat_req).await?)
        }
        ApiFlavor::Responses => {
            let responses_req = crate::transform::responses::to_responses(req, model)?;
            Box::pin(upstream.post_stream(url, bearer_token, &responses_req).await?)
        }
    };
    Ok(boxed)
}

fn assemble_sse_stream(
    flavor: ApiFlavor,
    stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    async_stream::stream! {
        let mut assembler = BlockAssembler::new();
        let mut responses_state = stream_responses::ResponsesStreamState::new();
        let mut buffer = String::new();
        tokio::pin!(stream);

        'outer: while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let mut events = Vec::new();
                    assembler.error("stream_error", format!("upstream connection error: {e}"), &mut events);
                    for event in &events {
                        yield Ok(sse_frame(event));
                    }
                    break 'outer;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find("\n\n") {
                let frame = buffer[..pos].to_string();
                buffer.drain(..=pos + 1);
                if frame.trim().is_empty() {
                    continue;
                }

                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data.trim() == "[DONE]" {
                        continue;
                    }

                    let events: Vec<StreamEvent> = match flavor {
                        ApiFlavor::Chat => stream_chat::handle_chunk(&mut assembler, data),
                        ApiFlavor::Responses => {
                            stream_responses::handle_event(&mut assembler, &mut responses_state, data)
                        }
                    };
                    for event in &events {
                        yield Ok(sse_frame(event));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::anthropic::{Message, MessageContent};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn wrong_endpoint_markers_are_case_insensitive() {
        assert!(looks_like_wrong_endpoint("This is not a CHAT model, use the responses endpoint"));
        assert!(looks_like_wrong_endpoint("model must use the Responses API instead"));
        assert!(!looks_like_wrong_endpoint("insufficient_quota: you have exceeded your quota"));
    }

    fn config_for(server: &MockServer) -> Config {
        Config::for_tests().with_upstream_base_url(server.uri()).unwrap()
    }

    fn text_request(model: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: model.to_string(),
            messages: vec![Message { role: "user".to_string(), content: MessageContent::Text("hi".to_string()) }],
            system: None,
            max_tokens: Some(16),
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: Some(false),
            tools: None,
            tool_choice: None,
            metadata: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn non_streaming_round_trip_through_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{"message": {"content": "hello there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let config = config_for(&server);
        let upstream = UpstreamClient::new(reqwest::Client::new());
        let req = text_request("gpt-4o-mini");

        let resp = dispatch_non_streaming(&config, &upstream, "client-key", &req).await.unwrap();
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(resp.usage.input_tokens, 3);
    }

    #[tokio::test]
    async fn misclassified_model_falls_back_to_the_other_flavor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "This model must use the Responses API"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_1",
                "model": "gpt-5-nonstandard",
                "status": "completed",
                "output": [{"type": "message", "content": [{"type": "output_text", "text": "ok"}]}]
            })))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config
            .model_classification_overrides
            .insert("gpt-5-nonstandard".to_string(), ApiFlavor::Chat);
        let upstream = UpstreamClient::new(reqwest::Client::new());
        let req = text_request("gpt-5-nonstandard");

        let resp = dispatch_non_streaming(&config, &upstream, "client-key", &req).await.unwrap();
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
    }
}
