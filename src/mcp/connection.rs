//! An open session with one MCP tool server
//!
//! [`McpConnection`] owns the transport, the JSON-RPC client and the
//! background tasks that move messages between them. All of it is tied to a
//! single [`CancellationToken`] that [`McpConnection::close`] fires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ParleyError, Result};
use crate::mcp::client::{start_read_loop, JsonRpcClient};
use crate::mcp::protocol::{InitializedMcpProtocol, McpProtocol};
use crate::mcp::transport::http::HttpTransport;
use crate::mcp::transport::sse::SseTransport;
use crate::mcp::transport::Transport;
use crate::mcp::types::{CallToolResponse, McpTool};

/// Which MCP transport an endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Streamable HTTP
    Http,
    /// Legacy HTTP+SSE
    Sse,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Http => write!(f, "http"),
            EndpointKind::Sse => write!(f, "sse"),
        }
    }
}

/// Initialized session with a tool server
pub struct McpConnection {
    kind: EndpointKind,
    endpoint: String,
    session: InitializedMcpProtocol,
    transport: Arc<dyn Transport>,
    cancellation: CancellationToken,
    /// Transport pumps; the read loop exits on its own once cancelled and
    /// fails any request still waiting
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpConnection")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("closed", &self.cancellation.is_cancelled())
            .finish()
    }
}

impl McpConnection {
    /// Connect to `endpoint` and complete the `initialize` handshake
    ///
    /// `timeout` bounds the connect and every request on the connection.
    ///
    /// # Errors
    ///
    /// Returns the transport or protocol error; nothing is left running
    /// when this fails.
    pub async fn connect(kind: EndpointKind, endpoint: &str, timeout: Duration) -> Result<Self> {
        let url = url::Url::parse(endpoint.trim())?;
        let transport: Arc<dyn Transport> = match kind {
            EndpointKind::Http => Arc::new(HttpTransport::new(url, timeout)?),
            EndpointKind::Sse => Arc::new(SseTransport::connect(url, timeout).await?),
        };
        Self::over_transport(kind, endpoint.trim(), transport, timeout).await
    }

    /// Run the MCP session over an already constructed transport
    ///
    /// # Errors
    ///
    /// Returns the handshake error after tearing the connection down
    pub async fn over_transport(
        kind: EndpointKind,
        endpoint: &str,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<Self> {
        let cancellation = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        let client = Arc::new(JsonRpcClient::new(endpoint, outbound_tx));
        start_read_loop(inbound_rx, cancellation.clone(), Arc::clone(&client));
        let pumps = vec![
            spawn_outbound_pump(
                outbound_rx,
                inbound_tx.clone(),
                Arc::clone(&transport),
                cancellation.clone(),
            ),
            spawn_inbound_pump(
                endpoint.to_string(),
                inbound_tx,
                Arc::clone(&transport),
                cancellation.clone(),
            ),
        ];

        let session = match McpProtocol::new(client, timeout).initialize().await {
            Ok(session) => session,
            Err(e) => {
                cancellation.cancel();
                for pump in &pumps {
                    pump.abort();
                }
                if let Err(close_err) = transport.close().await {
                    tracing::debug!(endpoint, "MCP close after failed initialize: {}", close_err);
                }
                return Err(e);
            }
        };
        transport.set_protocol_version(session.protocol_version());

        Ok(Self {
            kind,
            endpoint: endpoint.to_string(),
            session,
            transport,
            cancellation,
            pumps: Mutex::new(pumps),
        })
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Every tool the server offers
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed, or with the request error
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        self.ensure_open()?;
        self.session.list_tools().await
    }

    /// Invoke a tool on the server
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed, or with the request error
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResponse> {
        self.ensure_open()?;
        self.session.call_tool(name, Some(arguments)).await
    }

    /// Stop the background tasks and end the server session
    ///
    /// Calling `close` more than once is harmless.
    pub async fn close(&self) {
        if self.cancellation.is_cancelled() {
            return;
        }
        self.cancellation.cancel();
        for pump in self.pumps.lock().await.drain(..) {
            pump.abort();
        }
        if let Err(e) = self.transport.close().await {
            tracing::debug!(endpoint = %self.endpoint, "MCP close failed: {}", e);
        }
        tracing::debug!(endpoint = %self.endpoint, kind = %self.kind, "MCP connection closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(ParleyError::McpTransport(format!(
                "connection to {} is closed",
                self.endpoint
            ))
            .into());
        }
        Ok(())
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

/// Forward client messages to the transport in order
///
/// A request the transport fails to deliver is answered locally with an
/// error response so its caller fails fast instead of waiting out the
/// timeout.
fn spawn_outbound_pump(
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<String>,
    transport: Arc<dyn Transport>,
    cancellation: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                message = outbound_rx.recv() => match message {
                    Some(m) => m,
                    None => break,
                },
            };

            let id = serde_json::from_str::<serde_json::Value>(&message)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .filter(|id| !id.is_null());

            if let Err(e) = transport.send(message).await {
                tracing::debug!("MCP send failed: {}", e);
                if let Some(id) = id {
                    let reply = serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32000, "message": e.to_string()}
                    });
                    let _ = inbound_tx.send(reply.to_string());
                }
            }
        }
    })
}

fn spawn_inbound_pump(
    endpoint: String,
    inbound_tx: mpsc::UnboundedSender<String>,
    transport: Arc<dyn Transport>,
    cancellation: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut messages = transport.receive();
        let mut diagnostics = transport.receive_err();
        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                message = messages.next() => match message {
                    Some(m) => {
                        if inbound_tx.send(m).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(line) = diagnostics.next() => {
                    tracing::debug!(endpoint = %endpoint, "MCP transport: {}", line);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::fake::{spawn_fake_server, FakeTransport};
    use std::sync::atomic::Ordering;

    async fn fake_connection() -> (McpConnection, Arc<std::sync::atomic::AtomicBool>) {
        let (transport, handle) = FakeTransport::new();
        let closed = spawn_fake_server(
            handle,
            vec![serde_json::json!({
                "name": "echo",
                "description": "Echo arguments",
                "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
            })],
        );
        let conn = McpConnection::over_transport(
            EndpointKind::Http,
            "fake://server",
            Arc::new(transport),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        (conn, closed)
    }

    #[tokio::test]
    async fn test_list_and_call_over_fake_transport() {
        let (conn, _closed) = fake_connection().await;

        let tools = conn.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let resp = conn
            .call_tool("echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(resp.text(), r#"{"text":"hi"}"#);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_calls() {
        let (conn, closed) = fake_connection().await;
        conn.close().await;
        conn.close().await;

        assert!(conn.is_closed());
        assert!(closed.load(Ordering::SeqCst));
        let err = conn.list_tools().await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_send_failure_fails_request_fast() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);

        let started = std::time::Instant::now();
        let err = McpConnection::over_transport(
            EndpointKind::Sse,
            "fake://gone",
            Arc::new(transport),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err.downcast_ref::<ParleyError>(), Some(ParleyError::Mcp(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = McpConnection::connect(EndpointKind::Http, "not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<url::ParseError>(), Some(_)));
    }

    #[test]
    fn test_endpoint_kind_display() {
        assert_eq!(EndpointKind::Http.to_string(), "http");
        assert_eq!(EndpointKind::Sse.to_string(), "sse");
    }
}
