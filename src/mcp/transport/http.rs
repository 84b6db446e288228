//! Streamable HTTP transport
//!
//! Every outbound JSON-RPC message is POSTed to the endpoint. The server
//! answers with `application/json`, with a `text/event-stream` body carrying
//! one or more messages, or with `202 Accepted` for notifications.
//!
//! An `MCP-Session-Id` header returned by the server is echoed on every later
//! request. Closing the transport (or dropping it with a session still open)
//! sends a `DELETE` so the server can release the session.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::error::{ParleyError, Result};
use crate::mcp::transport::{channel_stream, Transport};
use crate::mcp::types::LATEST_PROTOCOL_VERSION;
use crate::sse::decode_stream;

const SESSION_HEADER: &str = "MCP-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

/// Streamable HTTP transport
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use parley::mcp::transport::http::HttpTransport;
///
/// let url = url::Url::parse("http://localhost:3000/mcp").unwrap();
/// let transport = HttpTransport::new(url, Duration::from_secs(30)).unwrap();
/// assert_eq!(transport.endpoint().path(), "/mcp");
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: url::Url,
    session_id: Arc<RwLock<Option<String>>>,
    protocol_version: std::sync::RwLock<String>,
    last_event_id: Arc<RwLock<Option<String>>>,
    response_tx: mpsc::UnboundedSender<String>,
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    error_tx: mpsc::UnboundedSender<String>,
    error_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl HttpTransport {
    /// Create a transport; no network I/O happens until the first `send`
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::McpTransport` if the HTTP client cannot be built
    pub fn new(endpoint: url::Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::McpTransport(format!("Failed to create HTTP client: {}", e)))?;

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        Ok(Self {
            http_client,
            endpoint,
            session_id: Arc::new(RwLock::new(None)),
            protocol_version: std::sync::RwLock::new(LATEST_PROTOCOL_VERSION.to_string()),
            last_event_id: Arc::new(RwLock::new(None)),
            response_tx,
            response_rx: Arc::new(Mutex::new(response_rx)),
            error_tx,
            error_rx: Arc::new(Mutex::new(error_rx)),
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Session id assigned by the server, if any
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    fn protocol_version(&self) -> String {
        self.protocol_version
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|_| LATEST_PROTOCOL_VERSION.to_string())
    }

    async fn handle_success(&self, response: reqwest::Response) -> Result<()> {
        if let Some(new_session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut sid = self.session_id.write().await;
            if sid.is_none() {
                tracing::debug!(endpoint = %self.endpoint, "MCP session established");
                *sid = Some(new_session.to_string());
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            let response_tx = self.response_tx.clone();
            let error_tx = self.error_tx.clone();
            let last_event_id = Arc::clone(&self.last_event_id);
            tokio::spawn(forward_sse_messages(
                response.bytes_stream(),
                response_tx,
                error_tx,
                last_event_id,
            ));
            return Ok(());
        }

        let body = response.text().await.map_err(|e| {
            ParleyError::McpTransport(format!("Failed to read response body: {}", e))
        })?;
        let body = body.trim();
        if body.is_empty() {
            return Ok(());
        }

        // A JSON body may hold a batch of messages.
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Array(items)) => {
                for item in items {
                    let _ = self.response_tx.send(item.to_string());
                }
            }
            _ => {
                let _ = self.response_tx.send(body.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, message: String) -> Result<()> {
        let mut req = self
            .http_client
            .post(self.endpoint.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .header(PROTOCOL_HEADER, self.protocol_version())
            .body(message);

        if let Some(id) = self.session_id.read().await.as_deref() {
            req = req.header(SESSION_HEADER, id);
        }
        if let Some(id) = self.last_event_id.read().await.as_deref() {
            req = req.header("Last-Event-ID", id);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::McpTransport(format!("HTTP POST failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        if status == StatusCode::NOT_FOUND {
            let mut sid = self.session_id.write().await;
            if sid.take().is_some() {
                return Err(ParleyError::Mcp("MCP session expired".to_string()).into());
            }
            return Err(ParleyError::McpTransport("HTTP 404 Not Found".to_string()).into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::McpTransport(format!(
                "HTTP POST returned status {}: {}",
                status,
                body.trim()
            ))
            .into());
        }

        self.handle_success(response).await
    }

    fn receive(&self) -> std::pin::Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.response_rx))
    }

    fn receive_err(&self) -> std::pin::Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.error_rx))
    }

    fn set_protocol_version(&self, version: &str) {
        if let Ok(mut v) = self.protocol_version.write() {
            *v = version.to_string();
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(sid) = self.session_id.write().await.take() else {
            return Ok(());
        };

        let response = self
            .http_client
            .delete(self.endpoint.as_str())
            .header(SESSION_HEADER, sid)
            .header(PROTOCOL_HEADER, self.protocol_version())
            .send()
            .await
            .map_err(|e| ParleyError::McpTransport(format!("HTTP DELETE failed: {}", e)))?;

        // 405 means the server does not support explicit termination.
        if !response.status().is_success() && response.status() != StatusCode::METHOD_NOT_ALLOWED {
            tracing::debug!(
                endpoint = %self.endpoint,
                status = %response.status(),
                "MCP session DELETE rejected"
            );
        }
        Ok(())
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        let session_id = match self.session_id.try_read() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        let Some(sid) = session_id else {
            return;
        };

        // Drop can run inside the runtime, so the blocking client gets its
        // own thread.
        let endpoint = self.endpoint.to_string();
        std::thread::spawn(move || {
            if let Ok(client) = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
            {
                let _ = client.delete(&endpoint).header(SESSION_HEADER, sid).send();
            }
        });
    }
}

/// Forward the `data` of every non-ping event to `response_tx`
pub(crate) async fn forward_sse_messages<S>(
    byte_stream: S,
    response_tx: mpsc::UnboundedSender<String>,
    error_tx: mpsc::UnboundedSender<String>,
    last_event_id: Arc<RwLock<Option<String>>>,
) where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    let mut events = Box::pin(decode_stream(byte_stream));
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                if let Some(id) = &event.id {
                    *last_event_id.write().await = Some(id.clone());
                }
                if event.is_ping() || event.data.trim().is_empty() {
                    continue;
                }
                if response_tx.send(event.data).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = error_tx.send(format!("SSE stream error: {}", e));
                break;
            }
        }
    }
}
