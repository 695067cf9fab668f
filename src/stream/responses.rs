//! Drives a [`BlockAssembler`] from a Responses API SSE event stream (spec.md
//! §4.4). Unlike Chat Completions' bare delta chunks, the Responses flavor
//! sends typed, named events; this translator dispatches on those names
//! instead of inferring shape from field presence.

use super::assembly::BlockAssembler;
use crate::models::{anthropic::StreamEvent, openai::ResponsesStreamEvent};
use crate::transform::common::map_stop_reason;
use std::collections::HashMap;

/// Per-stream bookkeeping the Responses flavor needs beyond what
/// [`BlockAssembler`] tracks: which output item a `function_call`'s
/// `call_id`/`name` belong to, since those only arrive on the `added` event
/// while argument deltas reference just `output_index`.
#[derive(Default)]
pub struct ResponsesStreamState {
    names: HashMap<u32, (String, String)>, // output_index -> (call_id, name)
}

impl ResponsesStreamState {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn handle_event(
    assembler: &mut BlockAssembler,
    state: &mut ResponsesStreamState,
    raw: &str,
) -> Vec<StreamEvent> {
    let mut out = Vec::new();

    let Ok(event) = serde_json::from_str::<ResponsesStreamEvent>(raw) else {
        return out;
    };

    match event {
        ResponsesStreamEvent::Created { response } => {
            if !assembler.has_started() {
                out.push(assembler.message_start(&response.id, &response.model));
            }
        }
        ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
            if let crate::models::openai::ResponsesStreamItem::FunctionCall { call_id, name, .. } = item {
                state.names.insert(output_index, (call_id, name));
            }
        }
        ResponsesStreamEvent::OutputTextDelta { output_index, delta } => {
            assembler.push_text(output_index as u64, &delta, &mut out);
        }
        ResponsesStreamEvent::FunctionCallArgumentsDelta { output_index, delta } => {
            let (id, name) = state
                .names
                .get(&output_index)
                .map(|(id, name)| (Some(id.as_str()), Some(name.as_str())))
                .unwrap_or((None, None));
            assembler.push_tool_call(output_index as u64, id, name, Some(&delta), &mut out);
        }
        ResponsesStreamEvent::OutputItemDone { .. } => {}
        ResponsesStreamEvent::Completed { response } => {
            let stop_reason = response
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref())
                .or(response.status.as_deref())
                .map(map_stop_reason);
            if let Some(usage) = response.usage {
                assembler.add_output_tokens(usage.output_tokens);
            }
            assembler.finish(stop_reason, &mut out);
        }
        ResponsesStreamEvent::Error { error } => {
            assembler.error("stream_error", error.message, &mut out);
        }
        ResponsesStreamEvent::Unknown => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_events_accumulate_into_one_block() {
        let mut assembler = BlockAssembler::new();
        let mut state = ResponsesStreamState::new();
        let created = r#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-5-mini","output":[]}}"#;
        let delta1 = r#"{"type":"response.output_text.delta","output_index":0,"delta":"hel"}"#;
        let delta2 = r#"{"type":"response.output_text.delta","output_index":0,"delta":"lo"}"#;

        let events = handle_event(&mut assembler, &mut state, created);
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));

        let events = handle_event(&mut assembler, &mut state, delta1);
        assert!(matches!(events[0], StreamEvent::ContentBlockStart { index: 0, .. }));
        let events = handle_event(&mut assembler, &mut state, delta2);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::ContentBlockDelta { index: 0, .. }));
    }

    #[test]
    fn function_call_name_resolved_from_added_event() {
        let mut assembler = BlockAssembler::new();
        let mut state = ResponsesStreamState::new();
        let added = r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","id":"item_1","call_id":"call_1","name":"search"}}"#;
        let delta = r#"{"type":"response.function_call_arguments.delta","output_index":0,"delta":"{\"q\":1}"}"#;

        handle_event(&mut assembler, &mut state, added);
        let events = handle_event(&mut assembler, &mut state, delta);
        match &events[0] {
            StreamEvent::ContentBlockStart {
                content_block: crate::models::anthropic::ResponseContent::ToolUse { id, name, .. },
                ..
            } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "search");
            }
            other => panic!("expected tool_use content_block_start, got {other:?}"),
        }
    }

    #[test]
    fn completed_with_incomplete_details_maps_max_tokens() {
        let mut assembler = BlockAssembler::new();
        let mut state = ResponsesStreamState::new();
        let completed = r#"{"type":"response.completed","response":{"id":"resp_1","model":"gpt-5-mini","output":[],"status":"incomplete","incomplete_details":{"reason":"max_output_tokens"}}}"#;
        let events = handle_event(&mut assembler, &mut state, completed);
        match events.iter().find(|e| matches!(e, StreamEvent::MessageDelta { .. })) {
            Some(StreamEvent::MessageDelta { delta, .. }) => {
                assert_eq!(delta.stop_reason.as_deref(), Some("max_tokens"));
            }
            other => panic!("expected message_delta, got {other:?}"),
        }
        assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));
    }
}
