//! Typed MCP lifecycle over [`JsonRpcClient`]
//!
//! [`McpProtocol`] is a session that has not yet shaken hands;
//! [`McpProtocol::initialize`] consumes it and returns an
//! [`InitializedMcpProtocol`] on which `tools/list` and `tools/call` are
//! available.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ParleyError, Result};
use crate::mcp::client::JsonRpcClient;
use crate::mcp::types::{
    CallToolParams, CallToolResponse, Implementation, InitializeParams, InitializeResponse,
    ListToolsResponse, McpTool, PaginatedParams, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Upper bound on `tools/list` pages followed
const MAX_TOOL_PAGES: usize = 64;

/// An MCP session before the `initialize` handshake
#[derive(Debug)]
pub struct McpProtocol {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
}

impl McpProtocol {
    /// Wrap a client whose read loop is already running
    pub fn new(client: Arc<JsonRpcClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Perform `initialize` and send `notifications/initialized`
    ///
    /// # Errors
    ///
    /// - `ParleyError::McpProtocolVersion` when the server picks a revision
    ///   this client does not speak
    /// - any error from [`JsonRpcClient::request`]
    pub async fn initialize(self) -> Result<InitializedMcpProtocol> {
        let response: InitializeResponse = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: serde_json::json!({}),
                    client_info: Implementation::parley(),
                },
                Some(self.timeout),
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(ParleyError::McpProtocolVersion {
                expected: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            }
            .into());
        }

        tracing::debug!(
            server = %self.client.server(),
            name = %response.server_info.name,
            version = %response.server_info.version,
            protocol = %response.protocol_version,
            "MCP session initialized"
        );

        self.client.notify(METHOD_INITIALIZED, serde_json::json!({}))?;

        Ok(InitializedMcpProtocol {
            client: self.client,
            timeout: self.timeout,
            initialize_response: response,
        })
    }
}

/// A negotiated MCP session
#[derive(Debug)]
pub struct InitializedMcpProtocol {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
    /// What the server answered to `initialize`
    pub initialize_response: InitializeResponse,
}

impl InitializedMcpProtocol {
    /// Protocol revision the server selected
    pub fn protocol_version(&self) -> &str {
        &self.initialize_response.protocol_version
    }

    /// List every tool, following `nextCursor` until the server stops
    ///
    /// # Errors
    ///
    /// Returns the first failing page's error
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let page: ListToolsResponse = self
                .client
                .request(METHOD_TOOLS_LIST, PaginatedParams { cursor }, Some(self.timeout))
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(
            server = %self.client.server(),
            "tools/list still paging after {} pages; using what was received",
            MAX_TOOL_PAGES
        );
        Ok(tools)
    }

    /// Invoke `name` with `arguments`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers with a
    /// JSON-RPC error. A tool-level failure (`isError`) is returned as `Ok`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResponse> {
        self.client
            .request(
                METHOD_TOOLS_CALL,
                CallToolParams {
                    name: name.to_string(),
                    arguments,
                },
                Some(self.timeout),
            )
            .await
    }
}
