//! OpenAI-compatible chat completions provider
//!
//! Serves OpenAI, Groq, Mistral, OpenRouter and DeepSeek, which all expose
//! `POST {base}/chat/completions` with bearer auth and SSE streaming.

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
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Provider speaking the OpenAI chat completions protocol
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// Tool call fragments keyed by their stream index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    partial: BTreeMap<usize, (String, String, String)>,
}

impl ToolCallAccumulator {
    fn push(&mut self, fragment: ChunkToolCall) {
        let entry = self.partial.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            entry.0 = id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                entry.1.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.2.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_iter()
            .filter(|(_, (_, name, _))| !name.is_empty())
            .map(|(index, (id, name, arguments))| {
                let id = if id.is_empty() {
                    format!("call_{}", index)
                } else {
                    id
                };
                ToolCall::new(id, name, arguments)
            })
            .collect()
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(
        kind: ProviderKind,
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        tracing::info!(
            "Initialized {} provider: base_url={}, model={}",
            kind,
            base_url,
            model
        );
        Self {
            kind,
            client,
            api_key: api_key.into(),
            base_url,
            model,
        }
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<WireMessage> {
        crate::providers::validate_message_sequence(messages)
            .into_iter()
            .map(|m| WireMessage {
                role: m.role,
                content: m.content,
                tool_calls: m.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| WireToolCall {
                            id: tc.id,
                            r#type: "function",
                            function: WireFunctionCall {
                                name: tc.function.name,
                                arguments: tc.function.arguments,
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id,
                name: m.name,
            })
            .collect()
    }

    fn convert_tools(&self, tools: &[serde_json::Value]) -> Vec<WireTool> {
        tools
            .iter()
            .filter_map(tool_parts)
            .map(|(name, description, parameters)| WireTool {
                r#type: "function",
                function: WireFunction {
                    name,
                    description,
                    parameters,
                },
            })
            .collect()
    }

    fn build_request(&self, messages: &[Message], tools: &[serde_json::Value]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: self.convert_messages(messages),
            tools: self.convert_tools(tools),
            stream: true,
            // Only OpenAI itself is known to accept stream_options
            stream_options: (self.kind == ProviderKind::OpenAI)
                .then_some(StreamOptions { include_usage: true }),
        }
    }
}

/// Translate one SSE `data:` payload into events
///
/// Returns `Ok(true)` once the stream signalled completion.
fn handle_chunk(
    data: &str,
    tools: &mut ToolCallAccumulator,
    out: &mut Vec<StreamEvent>,
) -> Result<bool> {
    if data.trim() == "[DONE]" {
        out.extend(tools.drain().into_iter().map(StreamEvent::ToolCall));
        return Ok(true);
    }

    let chunk: ChunkResponse = serde_json::from_str(data)
        .map_err(|e| ParleyError::Provider(format!("Failed to parse stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ParleyError::Provider(message).into());
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            out.push(StreamEvent::TextDelta(text));
        }
        for fragment in choice.delta.tool_calls {
            tools.push(fragment);
        }
        if choice.finish_reason.is_some() {
            out.extend(tools.drain().into_iter().map(StreamEvent::ToolCall));
        }
    }

    if let Some(usage) = chunk.usage {
        out.push(StreamEvent::Usage(TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
        )));
    }
    Ok(false)
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<EventStream> {
        let request = self.build_request(messages, tools);
        tracing::debug!(
            "Sending {} request: {} messages, {} tools",
            self.kind,
            request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::error!("{} request failed: {}", self.kind, e);
                ParleyError::Provider(format!("{} request failed: {}", self.kind, e))
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(self.kind, response).await.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let kind = self.kind;
        tokio::spawn(async move {
            let mut events = Box::pin(decode_stream(response.bytes_stream()));
            let mut tools = ToolCallAccumulator::default();
            let mut finished = false;

            while let Some(item) = events.next().await {
                let sse = match item {
                    Ok(sse) => sse,
                    Err(e) => {
                        let _ = tx.send(Err(ParleyError::Provider(format!(
                            "{} stream interrupted: {}",
                            kind, e.without_url()
                        ))
                        .into()));
                        return;
                    }
                };
                if sse.is_ping() || sse.data.is_empty() {
                    continue;
                }

                let mut out = Vec::new();
                let result = handle_chunk(&sse.data, &mut tools, &mut out);
                for event in out {
                    if tx.send(Ok(event)).is_err() {
                        return;
                    }
                }
                match result {
                    Ok(true) => {
                        finished = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }

            if !finished {
                for call in tools.drain() {
                    let _ = tx.send(Ok(StreamEvent::ToolCall(call)));
                }
            }
            let _ = tx.send(Ok(StreamEvent::Done));
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
