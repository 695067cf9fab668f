//! Translates between the Anthropic Messages wire format and OpenAI Chat
//! Completions, in both directions (request and non-streaming response).

use super::common::{clean_schema, map_stop_reason, tool_choice_to_chat};
use crate::error::{ProxyError, ProxyResult};
use crate::models::{anthropic, openai};
use serde_json::{json, Value};

/// Converts an Anthropic request into a Chat Completions request, targeting
/// `model` (the id the dispatcher/router chose for this attempt).
pub fn to_chat_completions(req: &anthropic::AnthropicRequest, model: &str) -> ProxyResult<openai::ChatRequest> {
    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        messages.push(chat_message("system", Some(openai::ChatMessageContent::Text(system.joined())), None, None));
    }

    for msg in &req.messages {
        messages.extend(convert_message(msg)?);
    }

    let tools = convert_tools(req.tools.as_deref());
    let tool_choice = req.tool_choice.as_ref().map(tool_choice_to_chat);

    Ok(openai::ChatRequest {
        model: model.to_string(),
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req.stop_sequences.clone(),
        stream: req.stream,
        tools,
        tool_choice,
    })
}

fn chat_message(
    role: &str,
    content: Option<openai::ChatMessageContent>,
    tool_calls: Option<Vec<openai::ChatToolCall>>,
    tool_call_id: Option<String>,
) -> openai::ChatMessage {
    openai::ChatMessage { role: role.to_string(), content, tool_calls, tool_call_id, name: None }
}

fn convert_tools(tools: Option<&[anthropic::Tool]>) -> Option<Vec<openai::ChatTool>> {
    let tools = tools?;
    let converted: Vec<_> = tools
        .iter()
        .filter(|t| t.tool_type.as_deref() != Some("BatchTool"))
        .map(|t| openai::ChatTool {
            tool_type: "function".to_string(),
            function: openai::ChatFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: clean_schema(t.input_schema.clone()),
            },
        })
        .collect();
    if converted.is_empty() { None } else { Some(converted) }
}

/// Converts one Anthropic message into one or more Chat messages. Tool results
/// are split out into their own `role: "tool"` messages (spec.md §4.2).
fn convert_message(msg: &anthropic::Message) -> ProxyResult<Vec<openai::ChatMessage>> {
    let mut result = Vec::new();

    match &msg.content {
        anthropic::MessageContent::Text(text) => {
            result.push(chat_message(&msg.role, Some(openai::ChatMessageContent::Text(text.clone())), None, None));
        }
        anthropic::MessageContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            let mut tool_calls = Vec::new();

            for block in blocks {
                match block {
                    anthropic::ContentBlock::Text { text } => {
                        parts.push(openai::ChatContentPart::Text { text: text.clone() });
                    }
                    anthropic::ContentBlock::Image { source } => {
                        let data_url = format!("data:{};base64,{}", source.media_type, source.data);
                        parts.push(openai::ChatContentPart::ImageUrl {
                            image_url: openai::ChatImageUrl { url: data_url },
                        });
                    }
                    anthropic::ContentBlock::ToolUse { id, name, input } => {
                        let arguments = serde_json::to_string(input).map_err(ProxyError::from)?;
                        tool_calls.push(openai::ChatToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: openai::ChatFunctionCall { name: name.clone(), arguments },
                        });
                    }
                    anthropic::ContentBlock::ToolResult { tool_use_id, content, .. } => {
                        let text = content.as_ref().map(|c| c.as_text()).unwrap_or_default();
                        result.push(chat_message(
                            "tool",
                            Some(openai::ChatMessageContent::Text(text)),
                            None,
                            Some(tool_use_id.clone()),
                        ));
                    }
                    anthropic::ContentBlock::Thinking { .. } => {}
                    anthropic::ContentBlock::Unknown(raw) => {
                        parts.push(openai::ChatContentPart::Text { text: raw.to_string() });
                    }
                }
            }

            if !parts.is_empty() || !tool_calls.is_empty() {
                let content = match parts.as_slice() {
                    [] => None,
                    [openai::ChatContentPart::Text { text }] => {
                        Some(openai::ChatMessageContent::Text(text.clone()))
                    }
                    _ => Some(openai::ChatMessageContent::Parts(parts)),
                };
                let tool_calls = if tool_calls.is_empty() { None } else { Some(tool_calls) };
                result.push(chat_message(&msg.role, content, tool_calls, None));
            }
        }
    }

    Ok(result)
}

/// Converts a Chat Completions response into an Anthropic message (spec.md §4.3).
pub fn chat_to_anthropic(resp: openai::ChatResponse) -> ProxyResult<anthropic::AnthropicResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::Transform("Upstream response had no choices".to_string()))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(anthropic::ResponseContent::Text { text });
        }
    }

    if let Some(tool_calls) = choice.message.tool_calls {
        for call in tool_calls {
            let input: Value = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| json!({ "_raw": call.function.arguments }));
            content.push(anthropic::ResponseContent::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }
    }

    let stop_reason = choice.finish_reason.as_deref().map(map_stop_reason).map(str::to_string);
    let id = if resp.id.starts_with("msg_") { resp.id } else { format!("msg_{}", resp.id) };

    Ok(anthropic::AnthropicResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        model: resp.model,
        content,
        stop_reason,
        stop_sequence: None,
        usage: anthropic::Usage {
            input_tokens: resp.usage.map(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: resp.usage.map(|u| u.completion_tokens).unwrap_or(0),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anthropic::*;

    fn text_request(content: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message { role: "user".to_string(), content: MessageContent::Text(content.to_string()) }],
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

    #[test]
    fn plain_text_non_streaming_request() {
        let req = text_request("hi");
        let chat = to_chat_completions(&req, "gpt-4o-mini").unwrap();
        assert_eq!(chat.model, "gpt-4o-mini");
        assert_eq!(chat.messages.len(), 1);
        match &chat.messages[0].content {
            Some(openai::ChatMessageContent::Text(t)) => assert_eq!(t, "hi"),
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_non_streaming_response() {
        let resp = openai::ChatResponse {
            id: "abc123".to_string(),
            model: "gpt-4o-mini".to_string(),
            choices: vec![openai::ChatChoice {
                message: openai::ChatResponseMessage { content: Some("hello".to_string()), tool_calls: None },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(openai::ChatUsage { prompt_tokens: 1, completion_tokens: 1 }),
        };
        let anthropic_resp = chat_to_anthropic(resp).unwrap();
        assert_eq!(anthropic_resp.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(anthropic_resp.usage.input_tokens, 1);
        assert_eq!(anthropic_resp.usage.output_tokens, 1);
        match &anthropic_resp.content[0] {
            ResponseContent::Text { text } => assert_eq!(text, "hello"),
            other => panic!("expected text block, got {other:?}"),
        }
    }

    #[test]
    fn tool_result_becomes_separate_tool_message() {
        let req = AnthropicRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                Message {
                    role: "assistant".to_string(),
                    content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                        id: "t1".to_string(),
                        name: "f".to_string(),
                        input: json!({"x": 1}),
                    }]),
                },
                Message {
                    role: "user".to_string(),
                    content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: "t1".to_string(),
                        content: Some(ToolResultContent::Text("42".to_string())),
                        is_error: None,
                    }]),
                },
            ],
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
        };

        let chat = to_chat_completions(&req, "gpt-4o-mini").unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "assistant");
        let tool_calls = chat.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].id, "t1");
        assert_eq!(tool_calls[0].function.name, "f");
        assert_eq!(chat.messages[1].role, "tool");
        assert_eq!(chat.messages[1].tool_call_id.as_deref(), Some("t1"));
    }

    #[test]
    fn unparseable_tool_arguments_wrap_as_raw() {
        let resp = openai::ChatResponse {
            id: "abc".to_string(),
            model: "gpt-4o-mini".to_string(),
            choices: vec![openai::ChatChoice {
                message: openai::ChatResponseMessage {
                    content: None,
                    tool_calls: Some(vec![openai::ChatToolCallResp {
                        id: "call_1".to_string(),
                        function: openai::ChatFunctionCallResp {
                            name: "search".to_string(),
                            arguments: "not json".to_string(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let anthropic_resp = chat_to_anthropic(resp).unwrap();
        match &anthropic_resp.content[0] {
            ResponseContent::ToolUse { input, .. } => {
                assert_eq!(input["_raw"], "not json");
            }
            other => panic!("expected tool_use block, got {other:?}"),
        }
        assert_eq!(anthropic_resp.stop_reason.as_deref(), Some("tool_use"));
    }
}
