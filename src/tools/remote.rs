//! Remote MCP tools exposed through [`ToolExecutor`]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ParleyError, Result};
use crate::mcp::{McpConnection, McpTool};
use crate::tools::{ToolExecutor, ToolResult};

/// A tool living on an MCP server, called over the connection that listed it
#[derive(Debug, Clone)]
pub struct McpToolExecutor {
    connection: Arc<McpConnection>,
    tool: McpTool,
}

impl McpToolExecutor {
    pub fn new(connection: Arc<McpConnection>, tool: McpTool) -> Self {
        Self { connection, tool }
    }

    /// One executor per tool the connection lists
    ///
    /// # Errors
    ///
    /// Returns the `tools/list` error
    pub async fn discover(connection: &Arc<McpConnection>) -> Result<Vec<Arc<dyn ToolExecutor>>> {
        let tools = connection.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| Arc::new(Self::new(Arc::clone(connection), tool)) as Arc<dyn ToolExecutor>)
            .collect())
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    fn tool_definition(&self) -> Value {
        json!({
            "name": self.tool.name,
            "description": self.tool.description.clone().unwrap_or_default(),
            "parameters": self.tool.input_schema,
        })
    }

    fn name(&self) -> String {
        self.tool.name.clone()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let arguments = if args.is_null() { json!({}) } else { args };
        let response = self.connection.call_tool(&self.tool.name, arguments).await?;
        let text = response.text();

        if response.is_error.unwrap_or(false) {
            return Err(ParleyError::ToolExecution(text).into());
        }
        Ok(ToolResult::success(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::fake::{spawn_fake_server, FakeTransport};
    use crate::mcp::EndpointKind;
    use std::time::Duration;

    async fn connection(tools: Vec<Value>) -> Arc<McpConnection> {
        let (transport, handle) = FakeTransport::new();
        spawn_fake_server(handle, tools);
        Arc::new(
            McpConnection::over_transport(
                EndpointKind::Http,
                "fake://remote",
                Arc::new(transport),
                Duration::from_secs(2),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_discover_builds_definitions() {
        let conn = connection(vec![json!({
            "name": "lookup",
            "description": "Look something up",
            "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}
        })])
        .await;

        let tools = McpToolExecutor::discover(&conn).await.unwrap();
        assert_eq!(tools.len(), 1);
        let def = tools[0].tool_definition();
        assert_eq!(def["name"], "lookup");
        assert_eq!(def["description"], "Look something up");
        assert_eq!(def["parameters"]["properties"]["q"]["type"], "string");
    }

    #[tokio::test]
    async fn test_execute_returns_text_content() {
        let conn = connection(vec![json!({"name": "echo"})]).await;
        let tools = McpToolExecutor::discover(&conn).await.unwrap();

        let result = tools[0].execute(json!({"word": "hello"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, r#"{"word":"hello"}"#);
    }

    #[tokio::test]
    async fn test_execute_after_close_fails() {
        let conn = connection(vec![json!({"name": "echo"})]).await;
        let tools = McpToolExecutor::discover(&conn).await.unwrap();
        conn.close().await;

        assert!(tools[0].execute(json!({})).await.is_err());
    }
}
