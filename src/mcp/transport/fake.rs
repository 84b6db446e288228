//! In-memory transport for unit tests
//!
//! [`FakeTransport`] records what the client sends and replays whatever the
//! test pushes through its [`FakeTransportHandle`].

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ParleyError, Result};
use crate::mcp::transport::{channel_stream, Transport};

#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    closed: Arc<AtomicBool>,
}

/// Test-side ends of a [`FakeTransport`]
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the client sent
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Messages delivered to the client
    pub inbound_tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl FakeTransportHandle {
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl FakeTransport {
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                outbound_tx,
                inbound_rx: Arc::new(Mutex::new(inbound_rx)),
                closed: Arc::clone(&closed),
            },
            FakeTransportHandle {
                outbound_rx,
                inbound_tx,
                closed,
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx.send(message).map_err(|_| {
            ParleyError::McpTransport("fake transport handle dropped".to_string()).into()
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.inbound_rx))
    }

    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Answer MCP requests like a small tool server
///
/// Serves `initialize`, a single-page `tools/list` with the given tools and
/// a `tools/call` that echoes its arguments back as text.
pub fn spawn_fake_server(mut handle: FakeTransportHandle, tools: Vec<serde_json::Value>) -> Arc<AtomicBool> {
    let closed = Arc::clone(&handle.closed);
    tokio::spawn(async move {
        while let Some(raw) = handle.outbound_rx.recv().await {
            let Ok(req) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            let Some(id) = req.get("id").cloned() else {
                continue;
            };
            let result = match req["method"].as_str().unwrap_or_default() {
                "initialize" => serde_json::json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake", "version": "0.0.1"}
                }),
                "tools/list" => serde_json::json!({"tools": tools}),
                "tools/call" => serde_json::json!({
                    "content": [{"type": "text", "text": req["params"]["arguments"].to_string()}]
                }),
                _ => serde_json::json!({}),
            };
            let reply = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result});
            if handle.inbound_tx.send(reply.to_string()).is_err() {
                break;
            }
        }
    });
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_send_reaches_handle() {
        let (t, mut handle) = FakeTransport::new();
        t.send("hello".to_string()).await.unwrap();
        assert_eq!(handle.outbound_rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_inbound_reaches_receive() {
        let (t, handle) = FakeTransport::new();
        handle.inbound_tx.send("a".to_string()).unwrap();
        handle.inbound_tx.send("b".to_string()).unwrap();
        let mut stream = t.receive();
        assert_eq!(stream.next().await.unwrap(), "a");
        assert_eq!(stream.next().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn test_close_is_visible_to_handle() {
        let (t, handle) = FakeTransport::new();
        assert!(!handle.was_closed());
        t.close().await.unwrap();
        assert!(handle.was_closed());
    }

    #[tokio::test]
    async fn test_send_fails_after_handle_dropped() {
        let (t, handle) = FakeTransport::new();
        drop(handle);
        assert!(t.send("x".to_string()).await.is_err());
    }
}
