//! Shared content-block state machine driving both flavors' stream translators.
//!
//! Upstream deltas arrive keyed by an opaque `upstream_key` (the Chat flavor's
//! `tool_calls[].index`, or the Responses flavor's `output_index`; the single
//! running text/thinking channel uses a fixed sentinel key). Tool-call indices
//! are not Anthropic block indices — text may have opened block 0, so a tool
//! call can land on block 1, 2, ... — and upstream is free to interleave
//! deltas across several tool-call indices in the same chunk (parallel
//! function calling). The assembler keeps a small map from upstream key to
//! its Anthropic block, per spec.md §9's "small map keyed by upstream index"
//! note, so resuming an earlier index's arguments after another index opened
//! continues that index's own block instead of closing and reopening one.

use crate::models::anthropic::{
    ContentDelta, MessageDeltaBody, MessageDeltaUsage, MessageStartData, ResponseContent,
    StreamEvent, Usage,
};
use serde_json::json;
use std::collections::HashMap;

/// Sentinel upstream key for the single running text/thinking channel (flavors
/// that don't have a native index for it, i.e. Chat Completions).
pub const TEXT_CHANNEL: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Text,
    Thinking,
    ToolUse,
}

struct OpenBlock {
    kind: OpenKind,
    anthropic_index: u32,
}

/// Drives the Anthropic-side content block lifecycle from upstream deltas.
/// One instance per request; not reused across requests.
pub struct BlockAssembler {
    message_started: bool,
    next_index: u32,
    /// The single running text/thinking channel; closed whenever a tool call
    /// opens, since upstream never interleaves text with a tool call's own
    /// arguments the way it interleaves separate tool calls with each other.
    text_block: Option<OpenBlock>,
    /// Tool-call blocks, keyed by upstream index. Once opened, a tool-call
    /// block stays open (and keeps its Anthropic index) until `finish`/`error`
    /// closes it, so interleaved argument deltas for different calls each
    /// keep accumulating into their own block.
    tool_blocks: HashMap<u64, OpenBlock>,
    output_tokens: u32,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self {
            message_started: false,
            next_index: 0,
            text_block: None,
            tool_blocks: HashMap::new(),
            output_tokens: 0,
        }
    }

    pub fn has_started(&self) -> bool {
        self.message_started
    }

    pub fn message_start(&mut self, id: &str, model: &str) -> StreamEvent {
        self.message_started = true;
        StreamEvent::MessageStart {
            message: MessageStartData {
                id: id.to_string(),
                message_type: "message".to_string(),
                role: "assistant".to_string(),
                model: model.to_string(),
                content: vec![],
                stop_reason: None,
                stop_sequence: None,
                usage: Usage::default(),
            },
        }
    }

    fn alloc_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn close_text(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some(block) = self.text_block.take() {
            out.push(StreamEvent::ContentBlockStop { index: block.anthropic_index });
        }
    }

    /// Ensures the running text/thinking channel is open with the given
    /// `kind`, closing it first if it was open with a different kind.
    fn ensure_text_open(
        &mut self,
        kind: OpenKind,
        start_block: impl FnOnce() -> ResponseContent,
        out: &mut Vec<StreamEvent>,
    ) -> u32 {
        if let Some(block) = &self.text_block {
            if block.kind == kind {
                return block.anthropic_index;
            }
        }
        self.close_text(out);
        let index = self.alloc_index();
        out.push(StreamEvent::ContentBlockStart { index, content_block: start_block() });
        self.text_block = Some(OpenBlock { kind, anthropic_index: index });
        index
    }

    /// Ensures the tool-call block for `upstream_key` is open, allocating a
    /// fresh Anthropic index (and closing the text channel, if any) the first
    /// time this key is seen. Later calls for the same key reuse its index.
    fn ensure_tool_open(
        &mut self,
        upstream_key: u64,
        start_block: impl FnOnce() -> ResponseContent,
        out: &mut Vec<StreamEvent>,
    ) -> u32 {
        if let Some(block) = self.tool_blocks.get(&upstream_key) {
            return block.anthropic_index;
        }
        self.close_text(out);
        let index = self.alloc_index();
        out.push(StreamEvent::ContentBlockStart { index, content_block: start_block() });
        self.tool_blocks.insert(upstream_key, OpenBlock { kind: OpenKind::ToolUse, anthropic_index: index });
        index
    }

    /// `upstream_key` is accepted for symmetry with `push_tool_call` but
    /// unused: both flavors ever have at most one running text/thinking
    /// channel, so it doesn't need its own per-key slot.
    pub fn push_text(&mut self, _upstream_key: u64, text: &str, out: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        let index = self.ensure_text_open(OpenKind::Text, || ResponseContent::Text { text: String::new() }, out);
        out.push(StreamEvent::ContentBlockDelta { index, delta: ContentDelta::TextDelta { text: text.to_string() } });
    }

    pub fn push_thinking(&mut self, _upstream_key: u64, thinking: &str, out: &mut Vec<StreamEvent>) {
        if thinking.is_empty() {
            return;
        }
        let index =
            self.ensure_text_open(OpenKind::Thinking, || ResponseContent::Thinking { thinking: String::new() }, out);
        out.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::ThinkingDelta { thinking: thinking.to_string() },
        });
    }

    /// `id`/`name` are only present on the first delta for a given tool call;
    /// later deltas for the same `upstream_key` only carry `arguments`, and
    /// since the block for that key is already open they're ignored.
    pub fn push_tool_call(
        &mut self,
        upstream_key: u64,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
        out: &mut Vec<StreamEvent>,
    ) {
        let index = self.ensure_tool_open(
            upstream_key,
            || ResponseContent::ToolUse {
                id: id.unwrap_or_default().to_string(),
                name: name.unwrap_or_default().to_string(),
                input: json!({}),
            },
            out,
        );
        if let Some(args) = arguments {
            if !args.is_empty() {
                out.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::InputJsonDelta { partial_json: args.to_string() },
                });
            }
        }
    }

    pub fn add_output_tokens(&mut self, tokens: u32) {
        self.output_tokens = self.output_tokens.max(tokens);
    }

    /// Closes every still-open block (text channel, then tool-call blocks in
    /// ascending index order) and emits the terminal `message_delta` +
    /// `message_stop` pair. Always called exactly once per stream, success or
    /// failure — a stream that breaks mid-flight without `message_stop` leaves
    /// Anthropic SDK clients waiting forever on an unterminated message.
    pub fn finish(&mut self, stop_reason: Option<&str>, out: &mut Vec<StreamEvent>) {
        self.close_all(out);
        out.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody { stop_reason: stop_reason.map(str::to_string), stop_sequence: None },
            usage: MessageDeltaUsage { output_tokens: self.output_tokens },
        });
        out.push(StreamEvent::MessageStop);
    }

    /// Closes every still-open block and emits an `error` event followed by
    /// `message_stop` (REDESIGN: the terminal `message_stop` must be
    /// unconditional, even on error).
    pub fn error(&mut self, kind: &'static str, message: String, out: &mut Vec<StreamEvent>) {
        self.close_all(out);
        out.push(StreamEvent::Error { error: crate::models::anthropic::ErrorBody { kind: kind.to_string(), message } });
        out.push(StreamEvent::MessageStop);
    }

    fn close_all(&mut self, out: &mut Vec<StreamEvent>) {
        self.close_text(out);
        let mut indices: Vec<u32> = self.tool_blocks.values().map(|b| b.anthropic_index).collect();
        indices.sort_unstable();
        self.tool_blocks.clear();
        for index in indices {
            out.push(StreamEvent::ContentBlockStop { index });
        }
    }
}

impl Default for BlockAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_channel_stays_open_across_chunks() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_text(TEXT_CHANNEL, "hel", &mut out);
        a.push_text(TEXT_CHANNEL, "lo", &mut out);
        // one start, two deltas, no intermediate stop
        assert!(matches!(out[0], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(out[1], StreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(out[2], StreamEvent::ContentBlockDelta { index: 0, .. }));
    }

    #[test]
    fn switching_from_text_to_tool_closes_and_reopens() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_text(TEXT_CHANNEL, "hi", &mut out);
        a.push_tool_call(0, Some("call_1"), Some("search"), Some("{}"), &mut out);
        assert!(matches!(out[2], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(out[3], StreamEvent::ContentBlockStart { index: 1, .. }));
    }

    #[test]
    fn two_parallel_tool_calls_get_distinct_indices() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_tool_call(0, Some("call_1"), Some("a"), None, &mut out);
        a.push_tool_call(1, Some("call_2"), Some("b"), None, &mut out);
        a.push_tool_call(0, None, None, Some("{\"x\":1}"), &mut out);
        match &out[0] {
            StreamEvent::ContentBlockStart { index: 0, .. } => {}
            other => panic!("expected index 0 start, got {other:?}"),
        }
        match &out[1] {
            StreamEvent::ContentBlockStart { index: 1, .. } => {}
            other => panic!("expected index 1 start, got {other:?}"),
        }
        // resuming call 0 after call 1 opened continues call 0's own block —
        // no stop/reopen in between, arguments land on index 0 directly.
        match &out[2] {
            StreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::InputJsonDelta { partial_json } } => {
                assert_eq!(partial_json, "{\"x\":1}");
            }
            other => panic!("expected index 0 delta, got {other:?}"),
        }
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn finish_closes_interleaved_tool_blocks_in_index_order() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_tool_call(0, Some("call_1"), Some("a"), None, &mut out);
        a.push_tool_call(1, Some("call_2"), Some("b"), None, &mut out);
        out.clear();
        a.finish(Some("tool_use"), &mut out);
        assert!(matches!(out[0], StreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(out[1], StreamEvent::ContentBlockStop { index: 1 }));
        assert!(matches!(out[2], StreamEvent::MessageDelta { .. }));
        assert!(matches!(out[3], StreamEvent::MessageStop));
    }

    #[test]
    fn finish_always_emits_message_stop() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_text(TEXT_CHANNEL, "hi", &mut out);
        a.finish(Some("end_turn"), &mut out);
        assert!(matches!(out.last(), Some(StreamEvent::MessageStop)));
    }

    #[test]
    fn error_always_emits_message_stop() {
        let mut a = BlockAssembler::new();
        let mut out = Vec::new();
        a.push_text(TEXT_CHANNEL, "hi", &mut out);
        a.error("stream_error", "boom".to_string(), &mut out);
        assert!(matches!(out.last(), Some(StreamEvent::MessageStop)));
        assert!(matches!(out[out.len() - 2], StreamEvent::Error { .. }));
    }
}
