//! Google Gemini provider
//!
//! Uses `streamGenerateContent` with `alt=sse`. Gemini does not issue tool
//! call ids, so ids are generated locally and the function name is recovered
//! from the preceding assistant message when a tool result is sent back.

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

/// Header carrying the Gemini API key; the key never goes in the URL
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Provider for Gemini models
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

/// Remove JSON Schema keywords Gemini rejects
fn sanitize_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("additionalProperties");
            for value in map.values_mut() {
                sanitize_schema(value);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_schema),
        _ => {}
    }
}

fn parse_chunk(data: &str) -> Result<Vec<StreamEvent>> {
    let chunk: GenerateChunk = serde_json::from_str(data)
        .map_err(|e| ParleyError::Provider(format!("Failed to parse Gemini chunk: {}", e)))?;

    let mut out = Vec::new();
    for candidate in chunk.candidates {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                out.push(StreamEvent::TextDelta(text));
            }
            if let Some(call) = part.function_call {
                let args = if call.args.is_null() { json!({}) } else { call.args };
                out.push(StreamEvent::ToolCall(ToolCall::new(
                    format!("call_{}", ulid::Ulid::new()),
                    call.name,
                    args.to_string(),
                )));
            }
        }
    }
    if let Some(usage) = chunk.usage_metadata {
        out.push(StreamEvent::Usage(TokenUsage::new(
            usage.prompt_token_count,
            usage.candidates_token_count,
        )));
    }
    Ok(out)
}

impl GeminiProvider {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        tracing::info!(
            "Initialized Google provider: base_url={}, model={}",
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

    fn endpoint(&self) -> String {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    fn build_request(&self, messages: &[Message], tools: &[Value]) -> GenerateRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        let mut call_names: HashMap<String, String> = HashMap::new();

        for m in crate::providers::validate_message_sequence(messages) {
            match m.role.as_str() {
                "system" => {
                    if let Some(text) = m.content {
                        system_parts.push(json!({"text": text}));
                    }
                }
                "assistant" => {
                    let mut parts = Vec::new();
                    if let Some(text) = m.content.filter(|t| !t.is_empty()) {
                        parts.push(json!({"text": text}));
                    }
                    for call in m.tool_calls.unwrap_or_default() {
                        let args = call.arguments_json();
                        call_names.insert(call.id.clone(), call.function.name.clone());
                        parts.push(json!({
                            "functionCall": {"name": call.function.name, "args": args}
                        }));
                    }
                    if !parts.is_empty() {
                        contents.push(Content {
                            role: Some("model"),
                            parts,
                        });
                    }
                }
                "tool" => {
                    let id = m.tool_call_id.unwrap_or_default();
                    let name = call_names.get(&id).cloned().unwrap_or(id);
                    contents.push(Content {
                        role: Some("user"),
                        parts: vec![json!({
                            "functionResponse": {
                                "name": name,
                                "response": {"content": m.content.unwrap_or_default()}
                            }
                        })],
                    });
                }
                _ => contents.push(Content {
                    role: Some("user"),
                    parts: vec![json!({"text": m.content.unwrap_or_default()})],
                }),
            }
        }

        let declarations: Vec<Value> = tools
            .iter()
            .filter_map(tool_parts)
            .map(|(name, description, mut parameters)| {
                sanitize_schema(&mut parameters);
                json!({"name": name, "description": description, "parameters": parameters})
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(Content {
                role: None,
                parts: system_parts,
            }),
            tools: if declarations.is_empty() {
                Vec::new()
            } else {
                vec![json!({"functionDeclarations": declarations})]
            },
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[Message], tools: &[Value]) -> Result<EventStream> {
        let request = self.build_request(messages, tools);
        tracing::debug!(
            "Sending Gemini request: {} contents, {} tool groups",
            request.contents.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ParleyError::Provider(format!("Google request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(error_from_response(ProviderKind::Google, response).await.into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut events = Box::pin(decode_stream(response.bytes_stream()));
            while let Some(item) = events.next().await {
                let parsed = match item {
                    Ok(sse) if sse.data.trim().is_empty() => continue,
                    Ok(sse) => parse_chunk(&sse.data),
                    Err(e) => Err(ParleyError::Provider(format!(
                        "Google stream interrupted: {}",
                        e.without_url()
                    ))
                    .into()),
                };
                match parsed {
                    Ok(out) => {
                        for event in out {
                            if tx.send(Ok(event)).is_err() {
                                return;
                            }
                        }
                    }
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
