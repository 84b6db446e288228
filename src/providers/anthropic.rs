//! Anthropic Messages API provider

use crate::error::{ParleyError, Result};
use crate::providers::base::{error_from_response, tool_parts};
use crate::providers::{
    EventStream, Message, Provider, ProviderKind, StreamEvent, TokenUsage, ToolCall,
};
use crate::sse::decode_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Provider for Claude models
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: MessageStartBody,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<OutputUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    #[serde(default)]
    usage: Option<InputUsage>,
}

#[derive(Debug, Deserialize)]
struct InputUsage {
    #[serde(default)]
    input_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Per-stream decoding state
#[derive(Debug, Default)]
struct StreamState {
    input_tokens: usize,
    tool_blocks: HashMap<usize, (String, String, String)>,
}

impl StreamState {
    /// Translate one decoded event; returns `Ok(true)` at message end
    fn handle(&mut self, event: WireEvent, out: &mut Vec<StreamEvent>) -> Result<bool> {
        match event {
            WireEvent::MessageStart { message } => {
                self.input_tokens = message.usage.map(|u| u.input_tokens).unwrap_or(0);
            }
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { text } if !text.is_empty() => {
                    out.push(StreamEvent::TextDelta(text));
                }
                ContentBlock::ToolUse { id, name } => {
                    self.tool_blocks.insert(index, (id, name, String::new()));
                }
                _ => {}
            },
            WireEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => out.push(StreamEvent::TextDelta(text)),
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(block) = self.tool_blocks.get_mut(&index) {
                        block.2.push_str(&partial_json);
                    }
                }
                BlockDelta::Other => {}
            },
            WireEvent::ContentBlockStop { index } => {
                if let Some((id, name, input)) = self.tool_blocks.remove(&index) {
                    let arguments = if input.trim().is_empty() {
                        "{}".to_string()
                    } else {
                        input
                    };
                    out.push(StreamEvent::ToolCall(ToolCall::new(id, name, arguments)));
                }
            }
            WireEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    out.push(StreamEvent::Usage(TokenUsage::new(
                        self.input_tokens,
                        usage.output_tokens,
                    )));
                }
            }
            WireEvent::MessageStop => return Ok(true),
            WireEvent::Ping => {}
            WireEvent::Error { error } => {
                return Err(ParleyError::Provider(format!("Anthropic: {}", error.message)).into())
            }
        }
        Ok(false)
    }
}

impl AnthropicProvider {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        tracing::info!(
            "Initialized Anthropic provider: base_url={}, model={}",
            base_url,
            model
        );
        Self {
            client,
            api_key: api_key.into(),
            base_url,
            model,
        }
    }

    /// Split out the system prompt and convert the rest to content blocks
    ///
    /// Consecutive tool results are merged into a single user turn.
    fn convert_messages(&self, messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
        let mut system_parts = Vec::new();
        let mut converted: Vec<WireMessage> = Vec::new();

        for m in crate::providers::validate_message_sequence(messages) {
            match m.role.as_str() {
                "system" => {
                    if let Some(content) = m.content {
                        system_parts.push(content);
                    }
                }
                "tool" => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.unwrap_or_default(),
                        "content": m.content.unwrap_or_default(),
                    });
                    let merge = matches!(
                        converted.last(),
                        Some(last) if last.role == "user"
                            && last.content.iter().all(|b| b["type"] == "tool_result")
                    );
                    match converted.last_mut() {
                        Some(last) if merge => last.content.push(block),
                        _ => converted.push(WireMessage {
                            role: "user",
                            content: vec![block],
                        }),
                    }
                }
                "assistant" => {
                    let mut content = Vec::new();
                    if let Some(text) = m.content.filter(|t| !t.is_empty()) {
                        content.push(json!({"type": "text", "text": text}));
                    }
                    for call in m.tool_calls.unwrap_or_default() {
                        let input = call.arguments_json();
                        content.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.function.name,
                            "input": input,
                        }));
                    }
                    if !content.is_empty() {
                        converted.push(WireMessage {
                            role: "assistant",
                            content,
                        });
                    }
                }
                _ => {
                    let text = m.content.unwrap_or_default();
                    converted.push(WireMessage {
                        role: "user",
                        content: vec![json!({"type": "text", "text": text})],
                    });
                }
            }
        }

        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, converted)
    }

    fn build_request(&self, messages: &[Message], tools: &[Value]) -> MessagesRequest {
        let (system, messages) = self.convert_messages(messages);
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system,
            messages,
            tools: tools
                .iter()
                .filter_map(tool_parts)
                .map(|(name, description, input_schema)| WireTool {
                    name,
                    description,
                    input_schema,
                })
                .collect(),
            stream: true,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[Message], tools: &[Value]) -> Result<EventStream> {
        let request = self.build_request(messages, tools);
        tracing::debug!(
            "Sending Anthropic request: {} messages, {} tools",
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ParleyError::Provider(format!("Anthropic request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(error_from_response(ProviderKind::Anthropic, response)
                .await
                .into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut events = Box::pin(decode_stream(response.bytes_stream()));
            let mut state = StreamState::default();

            while let Some(item) = events.next().await {
                let sse = match item {
                    Ok(sse) => sse,
                    Err(e) => {
                        let _ = tx.send(Err(ParleyError::Provider(format!(
                            "Anthropic stream interrupted: {}",
                            e.without_url()
                        ))
                        .into()));
                        return;
                    }
                };
                if sse.data.trim().is_empty() {
                    continue;
                }
                let event: WireEvent = match serde_json::from_str(&sse.data) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!("Skipping unrecognised Anthropic event: {}", e);
                        continue;
                    }
                };

                let mut out = Vec::new();
                let result = state.handle(event, &mut out);
                for event in out {
                    if tx.send(Ok(event)).is_err() {
                        return;
                    }
                }
                match result {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(StreamEvent::Done));
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(Client::new(), "k", "http://localhost/v1", "claude-3-haiku-20240307")
    }

    #[test]
    fn test_system_prompt_moved_to_top_level() {
        let req = provider().build_request(
            &[Message::system("be nice"), Message::user("hi")],
            &[],
        );
        assert_eq!(req.system.as_deref(), Some("be nice"));
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.max_tokens, 4096);
    }

    #[test]
    fn test_tools_use_input_schema() {
        let req = provider().build_request(
            &[Message::user("hi")],
            &[json!({"name": "calculator", "description": "math", "parameters": {"type": "object"}})],
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_tool_results_merged_into_one_user_turn() {
        let messages = vec![
            Message::user("two things"),
            Message::assistant_with_tools(
                Some("checking".into()),
                vec![
                    ToolCall::new("a", "get_weather", "{\"city\":\"Paris\"}"),
                    ToolCall::new("b", "get_media", "{}"),
                ],
            ),
            Message::tool_result("a", "rain"),
            Message::tool_result("b", "movies"),
        ];
        let (_, converted) = provider().convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].content[0]["type"], "text");
        assert_eq!(converted[1].content[1]["input"]["city"], "Paris");
        assert_eq!(converted[2].role, "user");
        assert_eq!(converted[2].content.len(), 2);
        assert_eq!(converted[2].content[1]["tool_use_id"], "b");
    }

    fn feed(state: &mut StreamState, data: &str, out: &mut Vec<StreamEvent>) -> bool {
        let event: WireEvent = serde_json::from_str(data).unwrap();
        state.handle(event, out).unwrap()
    }

    #[test]
    fn test_stream_state_assembles_tool_use() {
        let mut state = StreamState::default();
        let mut out = Vec::new();
        feed(&mut state, r#"{"type":"message_start","message":{"usage":{"input_tokens":12}}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Let me check"}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather"}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"Oslo\"}"}}"#, &mut out);
        feed(&mut state, r#"{"type":"content_block_stop","index":1}"#, &mut out);
        feed(&mut state, r#"{"type":"message_delta","delta":{},"usage":{"output_tokens":7}}"#, &mut out);
        let done = feed(&mut state, r#"{"type":"message_stop"}"#, &mut out);

        assert!(done);
        assert_eq!(
            out,
            vec![
                StreamEvent::TextDelta("Let me check".into()),
                StreamEvent::ToolCall(ToolCall::new("toolu_1", "get_weather", "{\"city\":\"Oslo\"}")),
                StreamEvent::Usage(TokenUsage::new(12, 7)),
            ]
        );
    }

    #[test]
    fn test_stream_error_event() {
        let mut state = StreamState::default();
        let event: WireEvent =
            serde_json::from_str(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
                .unwrap();
        let err = state.handle(event, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }
}
