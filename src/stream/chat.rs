//! Drives a [`BlockAssembler`] from a Chat Completions SSE byte stream,
//! producing the Anthropic Messages SSE event sequence (spec.md §4.4).
//!
//! Reworks the teacher's inline `create_sse_stream` generator into a pure
//! function over one parsed chunk at a time, so the assembler's state (and the
//! always-emit-`message_stop` fix) is shared with the Responses flavor instead
//! of duplicated.

use super::assembly::{BlockAssembler, TEXT_CHANNEL};
use crate::models::{anthropic::StreamEvent, openai::ChatStreamChunk};
use crate::transform::common::map_stop_reason;

/// Parses one `data: ...` line's JSON payload and advances `assembler`,
/// returning the Anthropic events it produced. Returns `Ok(vec![])` for chunks
/// that don't advance the visible state (e.g. a chunk with no choices).
pub fn handle_chunk(assembler: &mut BlockAssembler, raw: &str) -> Vec<StreamEvent> {
    let mut out = Vec::new();

    let Ok(chunk) = serde_json::from_str::<ChatStreamChunk>(raw) else {
        return out;
    };

    if !assembler.has_started() {
        out.push(assembler.message_start(&chunk.id, &chunk.model));
    }

    let Some(choice) = chunk.choices.first() else {
        return out;
    };

    if let Some(reasoning) = &choice.delta.reasoning {
        assembler.push_thinking(TEXT_CHANNEL, reasoning, &mut out);
    }

    if let Some(content) = &choice.delta.content {
        assembler.push_text(TEXT_CHANNEL, content, &mut out);
    }

    if let Some(tool_calls) = &choice.delta.tool_calls {
        for call in tool_calls {
            let key = call.index as u64;
            let name = call.function.as_ref().and_then(|f| f.name.as_deref());
            let arguments = call.function.as_ref().and_then(|f| f.arguments.as_deref());
            assembler.push_tool_call(key, call.id.as_deref(), name, arguments, &mut out);
        }
    }

    if let Some(tokens) = chunk.usage.as_ref().map(|u| u.completion_tokens) {
        assembler.add_output_tokens(tokens);
    }

    if let Some(finish_reason) = &choice.finish_reason {
        assembler.finish(Some(map_stop_reason(finish_reason)), &mut out);
    }

    out
}
