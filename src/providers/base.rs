//! Base provider trait and common message types
//!
//! Every backend converts between these provider-neutral types and its own
//! wire format. Responses are always streamed: a provider returns a stream of
//! [`StreamEvent`]s and callers assemble text and tool calls from it.

use crate::error::Result;
use crate::providers::ProviderKind;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Message structure for conversation
///
/// Roles are `user`, `assistant`, `system` and `tool`. Tool result messages
/// carry the `tool_call_id` they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Optional participant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: Option<String>) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::providers::Message;
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", Some(content.into()))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", Some(content.into()))
    }

    /// Creates a tool result message answering `tool_call_id`
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::providers::Message;
    ///
    /// let msg = Message::tool_result("call_123", "22°C and clear");
    /// assert_eq!(msg.role, "tool");
    /// assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    /// ```
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role("tool", Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Creates an assistant message requesting tool calls
    ///
    /// Any text streamed before the calls is kept as `content`.
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::with_role("assistant", content.filter(|c| !c.is_empty()));
        msg.tool_calls = Some(tool_calls);
        msg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Function call information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string
    pub arguments: String,
}

/// A request from the model to run a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Parsed arguments; unparseable or empty arguments become `{}`
    pub fn arguments_json(&self) -> serde_json::Value {
        if self.function.arguments.trim().is_empty() {
            return serde_json::json!({});
        }
        serde_json::from_str(&self.function.arguments).unwrap_or_else(|e| {
            tracing::warn!(
                "Tool call {} has invalid JSON arguments: {}",
                self.function.name,
                e
            );
            serde_json::json!({})
        })
    }
}

/// Token usage information reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// # Examples
    ///
    /// ```
    /// use parley::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Model catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier sent to the provider API
    pub id: String,
    /// Human readable name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context_window: usize,
    /// Free-form pricing info, as reported by the catalog source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<serde_json::Value>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, context_window: usize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            context_window,
            pricing: None,
        }
    }
}

/// One increment of a streamed model response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Next chunk of assistant text
    TextDelta(String),
    /// A fully assembled tool call
    ToolCall(ToolCall),
    /// Token usage, usually near the end of the stream
    Usage(TokenUsage),
    /// The model finished this response
    Done,
}

/// A fully collected model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Fold one event into the response
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta(delta) => self.text.push_str(delta),
            StreamEvent::ToolCall(call) => self.tool_calls.push(call.clone()),
            StreamEvent::Usage(usage) => self.usage = Some(*usage),
            StreamEvent::Done => {}
        }
    }

    /// The assistant message this response represents
    pub fn to_message(&self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.text.clone())
        } else {
            Message::assistant_with_tools(Some(self.text.clone()), self.tool_calls.clone())
        }
    }
}

/// Stream of response events
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Provider trait for AI backends
///
/// `tools` are `{name, description, parameters}` JSON objects as produced by
/// [`crate::tools::ToolExecutor::tool_definition`].
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model id requests are sent with
    fn model(&self) -> &str;

    /// Start a streamed completion
    ///
    /// # Errors
    ///
    /// Returns error when the request cannot be sent or the provider rejects
    /// it. Failures after the first byte arrive as `Err` items on the stream.
    async fn stream(&self, messages: &[Message], tools: &[serde_json::Value])
        -> Result<EventStream>;

    /// Run a completion to the end and collect it
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<Completion> {
        let mut stream = self.stream(messages, tools).await?;
        let mut completion = Completion::default();
        while let Some(event) = stream.next().await {
            completion.apply(&event?);
        }
        Ok(completion)
    }
}

/// Drop tool messages that do not answer a tool call in the conversation
///
/// Providers reject tool results whose id they never issued, which happens
/// when history is trimmed between an assistant call and its result.
///
/// ```
/// use parley::providers::{Message, validate_message_sequence};
///
/// let messages = vec![
///     Message::user("Do something"),
///     Message::tool_result("call_123", "Result"),
/// ];
/// assert_eq!(validate_message_sequence(&messages).len(), 1);
/// ```
pub fn validate_message_sequence(messages: &[Message]) -> Vec<Message> {
    use std::collections::HashSet;

    let issued: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|tc| tc.id.as_str())
        .collect();

    messages
        .iter()
        .filter(|message| {
            if message.role != "tool" {
                return true;
            }
            match message.tool_call_id.as_deref() {
                Some(id) if issued.contains(id) => true,
                Some(id) => {
                    tracing::warn!("Dropping orphan tool message with tool_call_id: {}", id);
                    false
                }
                None => {
                    tracing::warn!("Dropping tool message without tool_call_id");
                    false
                }
            }
        })
        .cloned()
        .collect()
}

/// Split a tool definition into `(name, description, parameters)`
pub(crate) fn tool_parts(tool: &serde_json::Value) -> Option<(String, String, serde_json::Value)> {
    let obj = tool.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let description = obj
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string();
    let parameters = obj
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
    Some((name, description, parameters))
}

/// Read a failed response body into a provider error
pub(crate) async fn error_from_response(
    kind: ProviderKind,
    response: reqwest::Response,
) -> crate::error::ParleyError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", kind, status, body);
    crate::error::ParleyError::Provider(format!("{} returned error {}: {}", kind, status, body))
}
