//! Streaming translation (C4): turns an upstream SSE byte stream into the
//! Anthropic Messages SSE event stream, for both OpenAI-compatible flavors.

pub mod assembly;
pub mod chat;
pub mod responses;

use bytes::Bytes;

/// Serializes one Anthropic `StreamEvent` as a wire SSE frame: `event: <name>\ndata: <json>\n\n`.
pub fn sse_frame(event: &crate::models::anthropic::StreamEvent) -> Bytes {
    let data = serde_json::to_string(event).unwrap_or_default();
    Bytes::from(format!("event: {}\ndata: {data}\n\n", event.event_name()))
}
