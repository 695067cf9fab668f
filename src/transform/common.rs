//! Shared helpers used by both the Chat Completions and Responses translators:
//! JSON-Schema cleanup, the unified finish-reason table, and tool_choice mapping.

use serde_json::Value;

/// Removes JSON schema fields that some OpenAI-compatible backends reject (e.g.
/// `"format": "uri"`), recursively through `properties` and `items`.
pub fn clean_schema(mut schema: Value) -> Value {
    if let Some(obj) = schema.as_object_mut() {
        if obj.get("format").and_then(|v| v.as_str()) == Some("uri") {
            obj.remove("format");
        }
        if let Some(properties) = obj.get_mut("properties").and_then(|v| v.as_object_mut()) {
            for (_, value) in properties.iter_mut() {
                *value = clean_schema(value.clone());
            }
        }
        if let Some(items) = obj.get_mut("items") {
            *items = clean_schema(items.clone());
        }
    }
    schema
}

/// Unified upstream finish/stop token → Anthropic `stop_reason` mapping (spec.md
/// §4.3). Shared by both the non-streaming response translators and the stream
/// assembler's terminal event.
pub fn map_stop_reason(token: &str) -> &'static str {
    match token {
        "stop" | "completed" | "content_filter" => "end_turn",
        "tool_calls" | "function_call" | "requires_action" => "tool_use",
        "length" | "max_output_tokens" => "max_tokens",
        "stop_sequence" => "stop_sequence",
        _ => "end_turn",
    }
}

/// Derives a Responses-flavor stop reason from `response.status` and, when the
/// response is incomplete, `incomplete_details.reason` (spec.md §4.4,
/// `response.completed`).
pub fn responses_stop_reason(status: Option<&str>, incomplete_reason: Option<&str>) -> Option<String> {
    let token = incomplete_reason.or(status)?;
    Some(map_stop_reason(token).to_string())
}

/// Maps Anthropic's `tool_choice` onto the Chat Completions shape (spec.md §4.2):
/// `"auto"` → `"auto"`, `"any"` → `"required"`, `{type:"tool", name}` →
/// `{type:"function", function:{name}}`, `"none"` → `"none"`.
pub fn tool_choice_to_chat(choice: &crate::models::anthropic::ToolChoice) -> Value {
    use crate::models::anthropic::ToolChoice;
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "any" => Value::String("required".to_string()),
            "none" => Value::String("none".to_string()),
            _ => Value::String("auto".to_string()),
        },
        ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

/// Maps Anthropic's `tool_choice` onto the Responses flavor's flattened shape.
pub fn tool_choice_to_responses(choice: &crate::models::anthropic::ToolChoice) -> Value {
    use crate::models::anthropic::ToolChoice;
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "any" => Value::String("required".to_string()),
            "none" => Value::String("none".to_string()),
            _ => Value::String("auto".to_string()),
        },
        ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "name": name
        }),
    }
}
