//! Per-turn tool assembly
//!
//! Merges the built-in tools with whatever the configured MCP servers offer.
//! Both servers are contacted concurrently. Their tools are registered HTTP
//! first, then SSE, on top of the built-ins, so a remote tool replaces a
//! built-in of the same name. A server that cannot be reached or listed is
//! skipped with a warning; the turn continues with the remaining tools.

use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;

use crate::error::{ParleyError, Result};
use crate::mcp::{EndpointKind, McpConnection};
use crate::tools::registry_builder::ToolRegistryBuilder;
use crate::tools::remote::McpToolExecutor;
use crate::tools::{ToolExecutor, ToolRegistry};

/// Tools for one turn plus the server connections backing the remote ones
///
/// The caller owns the connections and must close them when the turn ends.
#[derive(Debug, Default)]
pub struct ToolAssembly {
    pub registry: ToolRegistry,
    pub connections: Vec<Arc<McpConnection>>,
}

impl ToolAssembly {
    /// Close every connection; safe to call more than once
    pub async fn close_all(&self) {
        futures::future::join_all(self.connections.iter().map(|c| c.close())).await;
    }
}

/// Treat blank endpoint strings as not configured
fn configured(endpoint: Option<&str>) -> Option<&str> {
    endpoint.map(str::trim).filter(|e| !e.is_empty())
}

/// Build the tool set for a turn
///
/// # Errors
///
/// Only built-in construction can fail the assembly; remote failures are
/// logged as [`ParleyError::ToolSourceUnavailable`] and skipped.
pub async fn assemble(
    builtins: &ToolRegistryBuilder,
    http_endpoint: Option<&str>,
    sse_endpoint: Option<&str>,
    timeout: Duration,
) -> Result<ToolAssembly> {
    let mut registry = builtins.build()?;
    let mut connections = Vec::new();

    let (http, sse) = tokio::join!(
        open_source(EndpointKind::Http, configured(http_endpoint), timeout),
        open_source(EndpointKind::Sse, configured(sse_endpoint), timeout),
    );

    for (connection, tools) in [http, sse].into_iter().flatten() {
        tracing::info!(
            endpoint = %connection.endpoint(),
            kind = %connection.kind(),
            count = tools.len(),
            "Loaded remote tools"
        );
        for tool in tools {
            registry.register(tool);
        }
        connections.push(connection);
    }

    Ok(ToolAssembly {
        registry,
        connections,
    })
}

/// Connect and list one source, or `None` when unset or unavailable
async fn open_source(
    kind: EndpointKind,
    endpoint: Option<&str>,
    timeout: Duration,
) -> Option<(Arc<McpConnection>, Vec<Arc<dyn ToolExecutor>>)> {
    let endpoint = endpoint?;

    match connect_and_list(kind, endpoint, timeout).await {
        Ok(source) => Some(source),
        Err(e) => {
            let err = ParleyError::ToolSourceUnavailable {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            };
            tracing::warn!(kind = %kind, "{}", err);
            increment_counter!("mcp_source_failures_total", "kind" => kind.to_string());
            None
        }
    }
}

async fn connect_and_list(
    kind: EndpointKind,
    endpoint: &str,
    timeout: Duration,
) -> Result<(Arc<McpConnection>, Vec<Arc<dyn ToolExecutor>>)> {
    let connection = Arc::new(McpConnection::connect(kind, endpoint, timeout).await?);
    match McpToolExecutor::discover(&connection).await {
        Ok(tools) => Ok((connection, tools)),
        Err(e) => {
            connection.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::credentials::env_from_map;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Streamable HTTP MCP server answering from a fixed tool list
    struct McpResponder {
        tools: Value,
        fail_list: bool,
    }

    impl Respond for McpResponder {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let Ok(msg) = serde_json::from_slice::<Value>(&request.body) else {
                return ResponseTemplate::new(400);
            };
            let Some(id) = msg.get("id").cloned() else {
                return ResponseTemplate::new(202);
            };
            let body = match msg["method"].as_str() {
                Some("initialize") => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "wiremock", "version": "1"}
                }}),
                Some("tools/list") if self.fail_list => json!({"jsonrpc": "2.0", "id": id,
                    "error": {"code": -32603, "message": "listing broke"}}),
                Some("tools/list") => {
                    json!({"jsonrpc": "2.0", "id": id, "result": {"tools": self.tools}})
                }
                Some("tools/call") => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "content": [{"type": "text", "text": format!("remote {}", msg["params"]["name"].as_str().unwrap_or_default())}]
                }}),
                _ => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            };
            ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
        }
    }

    async fn mcp_server(tools: Value, fail_list: bool) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(McpResponder { tools, fail_list })
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    fn builtins() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new(ToolsConfig::default()).with_env(env_from_map(HashMap::new()))
    }

    #[tokio::test]
    async fn test_no_endpoints_gives_builtins_only() {
        let assembly = assemble(&builtins(), None, Some("   "), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(assembly.connections.is_empty());
        assert!(assembly.registry.contains("get_weather"));
    }

    #[tokio::test]
    async fn test_remote_tools_are_merged_and_override_builtins() {
        let server = mcp_server(
            json!([
                {"name": "get_weather", "description": "Remote weather"},
                {"name": "remote_only", "inputSchema": {"type": "object"}}
            ]),
            false,
        )
        .await;
        let endpoint = format!("{}/mcp", server.uri());

        let assembly = assemble(
            &builtins(),
            Some(endpoint.as_str()),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(assembly.connections.len(), 1);
        assert!(assembly.registry.contains("remote_only"));
        let weather = assembly.registry.get("get_weather").unwrap();
        assert_eq!(weather.tool_definition()["description"], "Remote weather");

        let result = weather.execute(json!({"city": "Oslo"})).await.unwrap();
        assert_eq!(result.output, "remote get_weather");

        assembly.close_all().await;
        assert!(assembly.connections[0].is_closed());
    }

    #[tokio::test]
    async fn test_unavailable_sources_are_skipped() {
        let broken = mcp_server(json!([]), true).await;
        let endpoint = format!("{}/mcp", broken.uri());

        let assembly = assemble(
            &builtins(),
            Some(endpoint.as_str()),
            Some("http://127.0.0.1:1/sse"),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert!(assembly.connections.is_empty());
        assert_eq!(assembly.registry.len(), builtins().build().unwrap().len());
    }

    #[tokio::test]
    async fn test_malformed_endpoint_is_skipped() {
        let assembly = assemble(&builtins(), Some("not a url"), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(assembly.connections.is_empty());
        assert!(!assembly.registry.is_empty());
    }
}
