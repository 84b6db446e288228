//! Tools module for Parley
//!
//! This module contains the tool abstraction, the per-turn registry, the
//! built-in tools and the adapter that exposes remote MCP tools.
//!
//! A tool invocation is observed as a short sequence of [`ToolUpdate`]s: at
//! most one [`ToolUpdate::Pending`] placeholder followed by exactly one
//! [`ToolUpdate::Final`] result. Nothing is sent after the final result.

pub mod aggregator;
pub mod calculator;
pub mod image;
pub mod media;
pub mod places;
pub mod registry_builder;
pub mod remote;
pub mod search;
pub mod weather;

pub use aggregator::{assemble, ToolAssembly};
pub use registry_builder::ToolRegistryBuilder;
pub use remote::McpToolExecutor;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of one tool execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    /// Whether the tool execution succeeded
    pub success: bool,
    /// Text returned to the model
    pub output: String,
    /// Error message if execution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured payload for display, when the tool has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Whether `output` was cut short
    pub truncated: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            data: None,
            truncated: false,
        }
    }

    /// Successful result whose model-facing text is the JSON of `data`
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: data.to_string(),
            error: None,
            data: Some(data),
            truncated: false,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            data: None,
            truncated: false,
        }
    }

    /// Cut `output` to at most `max_bytes`, on a character boundary
    pub fn truncate_if_needed(mut self, max_bytes: usize) -> Self {
        if self.output.len() > max_bytes {
            let mut cut = max_bytes;
            while !self.output.is_char_boundary(cut) {
                cut -= 1;
            }
            self.output.truncate(cut);
            self.output.push_str("\n... (truncated)");
            self.truncated = true;
        }
        self
    }

    /// Text handed back to the model for this call
    pub fn to_message(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

/// Placeholder shown while a tool is running
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolProgress {
    /// Tool name
    pub tool: String,
    /// Short human-readable status, e.g. `Loading weather for Paris...`
    pub message: String,
}

/// One step of a tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolUpdate {
    /// Intermediate placeholder; sent at most once
    Pending(ToolProgress),
    /// Terminal result; always sent exactly once
    Final(ToolResult),
}

/// Tool executor trait for implementing tool execution logic
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use parley::error::Result;
/// use parley::tools::{ToolExecutor, ToolResult};
/// use serde_json::Value;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ToolExecutor for Echo {
///     fn tool_definition(&self) -> Value {
///         serde_json::json!({
///             "name": "echo",
///             "description": "Repeat the input",
///             "parameters": {"type": "object", "properties": {"text": {"type": "string"}}}
///         })
///     }
///
///     async fn execute(&self, args: Value) -> Result<ToolResult> {
///         Ok(ToolResult::success(args["text"].as_str().unwrap_or_default()))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// `{name, description, parameters}` with `parameters` a JSON Schema
    fn tool_definition(&self) -> serde_json::Value;

    /// Placeholder to show before `execute` finishes, if the tool has one
    fn pending(&self, _args: &serde_json::Value) -> Option<String> {
        None
    }

    /// Executes the tool with the given arguments
    ///
    /// # Errors
    ///
    /// Any error is reported to the model as the tool's result text
    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult>;

    /// Name from the tool definition
    fn name(&self) -> String {
        self.tool_definition()["name"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

/// Run `executor` on its own task and stream its updates
///
/// The channel holds both possible updates, so the task never waits on a
/// slow reader. A failed execution becomes a failed [`ToolResult`].
pub fn invoke(
    executor: Arc<dyn ToolExecutor>,
    args: serde_json::Value,
) -> mpsc::Receiver<ToolUpdate> {
    let (tx, rx) = mpsc::channel(2);
    tokio::spawn(async move {
        let name = executor.name();
        if let Some(message) = executor.pending(&args) {
            let _ = tx
                .send(ToolUpdate::Pending(ToolProgress {
                    tool: name.clone(),
                    message,
                }))
                .await;
        }

        let result = match executor.execute(args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %name, "Tool execution failed: {}", e);
                ToolResult::error(e.to_string())
            }
        };
        let _ = tx.send(ToolUpdate::Final(result)).await;
    });
    rx
}

/// Tools available for one turn, keyed by name
///
/// Registering a name twice keeps the later executor.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolExecutor>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executor` under the name in its definition
    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) {
        let name = executor.name();
        if self.tools.insert(name.clone(), executor).is_some() {
            tracing::debug!(tool = %name, "Tool definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Definitions of every registered tool, sorted by name
    pub fn all_definitions(&self) -> Vec<serde_json::Value> {
        self.tools.values().map(|t| t.tool_definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Shared HTTP client for built-in tools
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            crate::error::ParleyError::ToolExecution(format!("Failed to create HTTP client: {}", e))
                .into()
        })
}

/// Required string argument `key`
pub(crate) fn string_arg<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            crate::error::ParleyError::ToolExecution(format!("Missing required argument: {}", key))
                .into()
        })
}
