//! Translates between the Anthropic Messages wire format and the OpenAI
//! Responses API, in both directions (request and non-streaming response).

use super::common::{clean_schema, responses_stop_reason, tool_choice_to_responses};
use crate::error::{ProxyError, ProxyResult};
use crate::models::{anthropic, openai};
use serde_json::{json, Value};

/// Converts an Anthropic request into a Responses API request, targeting `model`.
pub fn to_responses(req: &anthropic::AnthropicRequest, model: &str) -> ProxyResult<openai::ResponsesRequest> {
    let instructions = req.system.as_ref().map(|s| s.joined());

    let mut input = Vec::new();
    for msg in &req.messages {
        input.extend(convert_message(msg)?);
    }

    let tools = convert_tools(req.tools.as_deref());
    let tool_choice = req.tool_choice.as_ref().map(tool_choice_to_responses);

    Ok(openai::ResponsesRequest {
        model: model.to_string(),
        input,
        instructions,
        max_output_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        tools,
        tool_choice,
        stream: req.stream,
        store: false,
    })
}

fn convert_tools(tools: Option<&[anthropic::Tool]>) -> Option<Vec<openai::ResponsesTool>> {
    let tools = tools?;
    let converted: Vec<_> = tools
        .iter()
        .filter(|t| t.tool_type.as_deref() != Some("BatchTool"))
        .map(|t| openai::ResponsesTool {
            tool_type: "function".to_string(),
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: clean_schema(t.input_schema.clone()),
            strict: false,
        })
        .collect();
    if converted.is_empty() { None } else { Some(converted) }
}

/// Converts one Anthropic message into one or more Responses input items.
/// `tool_use`/`tool_result` blocks each become their own item; `text`/`image`
/// blocks are grouped into a single `message` item per contiguous run.
fn convert_message(msg: &anthropic::Message) -> ProxyResult<Vec<openai::ResponsesInputItem>> {
    let mut items = Vec::new();
    let is_assistant = msg.role == "assistant";

    match &msg.content {
        anthropic::MessageContent::Text(text) => {
            items.push(message_item(&msg.role, is_assistant, vec![text.clone()], vec![]));
        }
        anthropic::MessageContent::Blocks(blocks) => {
            let mut texts = Vec::new();
            let mut images = Vec::new();

            for block in blocks {
                match block {
                    anthropic::ContentBlock::Text { text } => texts.push(text.clone()),
                    anthropic::ContentBlock::Image { source } => {
                        images.push(format!("data:{};base64,{}", source.media_type, source.data));
                    }
                    anthropic::ContentBlock::ToolUse { id, name, input } => {
                        flush_message(&mut items, &msg.role, is_assistant, &mut texts, &mut images);
                        let arguments = serde_json::to_string(input).map_err(ProxyError::from)?;
                        items.push(openai::ResponsesInputItem::FunctionCall {
                            call_id: id.clone(),
                            name: name.clone(),
                            arguments,
                        });
                    }
                    anthropic::ContentBlock::ToolResult { tool_use_id, content, .. } => {
                        flush_message(&mut items, &msg.role, is_assistant, &mut texts, &mut images);
                        let output = content.as_ref().map(|c| c.as_text()).unwrap_or_default();
                        items.push(openai::ResponsesInputItem::FunctionCallOutput {
                            call_id: tool_use_id.clone(),
                            output,
                        });
                    }
                    anthropic::ContentBlock::Thinking { .. } => {}
                    anthropic::ContentBlock::Unknown(raw) => texts.push(raw.to_string()),
                }
            }

            flush_message(&mut items, &msg.role, is_assistant, &mut texts, &mut images);
        }
    }

    Ok(items)
}

fn flush_message(
    items: &mut Vec<openai::ResponsesInputItem>,
    role: &str,
    is_assistant: bool,
    texts: &mut Vec<String>,
    images: &mut Vec<String>,
) {
    if texts.is_empty() && images.is_empty() {
        return;
    }
    items.push(message_item(role, is_assistant, std::mem::take(texts), std::mem::take(images)));
}

fn message_item(
    role: &str,
    is_assistant: bool,
    texts: Vec<String>,
    images: Vec<String>,
) -> openai::ResponsesInputItem {
    let mut content = Vec::new();
    for text in texts {
        content.push(if is_assistant {
            openai::ResponsesContentPart::OutputText { text }
        } else {
            openai::ResponsesContentPart::InputText { text }
        });
    }
    for image_url in images {
        content.push(openai::ResponsesContentPart::InputImage { image_url });
    }
    openai::ResponsesInputItem::Message { role: role.to_string(), content }
}

/// Converts a Responses API response into an Anthropic message (spec.md §4.3).
pub fn responses_to_anthropic(resp: openai::ResponsesResponse) -> ProxyResult<anthropic::AnthropicResponse> {
    let mut content = Vec::new();

    for item in &resp.output {
        match item {
            openai::ResponsesOutputItem::Message { content: parts } => {
                for part in parts {
                    if let openai::ResponsesOutputContent::OutputText { text } = part {
                        content.push(anthropic::ResponseContent::Text { text: text.clone() });
                    }
                }
            }
            openai::ResponsesOutputItem::FunctionCall { call_id, name, arguments } => {
                let input: Value = serde_json::from_str(arguments)
                    .unwrap_or_else(|_| json!({ "_raw": arguments }));
                content.push(anthropic::ResponseContent::ToolUse {
                    id: call_id.clone(),
                    name: name.clone(),
                    input,
                });
            }
            openai::ResponsesOutputItem::Reasoning { .. } | openai::ResponsesOutputItem::Unknown => {}
        }
    }

    let stop_reason = responses_stop_reason(
        resp.status.as_deref(),
        resp.incomplete_details.as_ref().and_then(|d| d.reason.as_deref()),
    );
    let id = if resp.id.starts_with("msg_") { resp.id.clone() } else { format!("msg_{}", resp.id) };

    Ok(anthropic::AnthropicResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        model: resp.model,
        content,
        stop_reason,
        stop_sequence: None,
        usage: anthropic::Usage {
            input_tokens: resp.usage.map(|u| u.input_tokens).unwrap_or(0),
            output_tokens: resp.usage.map(|u| u.output_tokens).unwrap_or(0),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anthropic::*;

    #[test]
    fn tool_use_and_tool_result_become_function_items() {
        let req = AnthropicRequest {
            model: "gpt-5-mini".to_string(),
            messages: vec![
                Message {
                    role: "assistant".to_string(),
                    content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
                        id: "call_1".to_string(),
                        name: "search".to_string(),
                        input: json!({"q": "hi"}),
                    }]),
                },
                Message {
                    role: "user".to_string(),
                    content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: "call_1".to_string(),
                        content: Some(ToolResultContent::Text("result".to_string())),
                        is_error: None,
                    }]),
                },
            ],
            system: Some(SystemPrompt::Single("be terse".to_string())),
            max_tokens: Some(32),
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

        let responses_req = to_responses(&req, "gpt-5-mini").unwrap();
        assert_eq!(responses_req.instructions.as_deref(), Some("be terse"));
        assert_eq!(responses_req.store, false);
        match &responses_req.input[0] {
            openai::ResponsesInputItem::FunctionCall { call_id, name, .. } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "search");
            }
            other => panic!("expected function_call item, got {other:?}"),
        }
        match &responses_req.input[1] {
            openai::ResponsesInputItem::FunctionCallOutput { call_id, output } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(output, "result");
            }
            other => panic!("expected function_call_output item, got {other:?}"),
        }
    }

    #[test]
    fn response_with_text_and_tool_call() {
        let resp = openai::ResponsesResponse {
            id: "resp_1".to_string(),
            model: "gpt-5-mini".to_string(),
            output: vec![
                openai::ResponsesOutputItem::Message {
                    content: vec![openai::ResponsesOutputContent::OutputText { text: "hi".to_string() }],
                },
                openai::ResponsesOutputItem::FunctionCall {
                    call_id: "call_1".to_string(),
                    name: "search".to_string(),
                    arguments: "{\"q\":\"x\"}".to_string(),
                },
            ],
            status: Some("completed".to_string()),
            incomplete_details: None,
            usage: Some(openai::ResponsesUsage { input_tokens: 3, output_tokens: 5 }),
        };

        let anthropic_resp = responses_to_anthropic(resp).unwrap();
        assert_eq!(anthropic_resp.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(anthropic_resp.usage.input_tokens, 3);
        assert_eq!(anthropic_resp.usage.output_tokens, 5);
        assert_eq!(anthropic_resp.content.len(), 2);
    }

    #[test]
    fn incomplete_max_output_tokens_maps_to_max_tokens() {
        let resp = openai::ResponsesResponse {
            id: "resp_2".to_string(),
            model: "gpt-5-mini".to_string(),
            output: vec![],
            status: Some("incomplete".to_string()),
            incomplete_details: Some(openai::ResponsesIncompleteDetails {
                reason: Some("max_output_tokens".to_string()),
            }),
            usage: None,
        };
        let anthropic_resp = responses_to_anthropic(resp).unwrap();
        assert_eq!(anthropic_resp.stop_reason.as_deref(), Some("max_tokens"));
    }
}
