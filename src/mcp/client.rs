//! Channel-backed JSON-RPC 2.0 client
//!
//! [`JsonRpcClient`] knows nothing about HTTP or SSE. Outbound messages are
//! pushed onto an mpsc channel that a transport drains; inbound messages are
//! fed to [`start_read_loop`], which resolves pending requests, answers
//! server pings and forwards notifications to registered handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ParleyError, Result};
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_PING};

/// Timeout applied when a caller does not give one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type NotificationHandler = Box<dyn Fn(Value) + Send + Sync + 'static>;

type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<Value, JsonRpcError>>>;

/// JSON-RPC 2.0 client over a pair of string channels
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use parley::mcp::client::{start_read_loop, JsonRpcClient};
///
/// # #[tokio::main]
/// # async fn main() {
/// let (out_tx, _out_rx) = mpsc::unbounded_channel::<String>();
/// let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
/// let token = CancellationToken::new();
/// let client = Arc::new(JsonRpcClient::new("docs", out_tx));
/// let handle = start_read_loop(in_rx, token.clone(), Arc::clone(&client));
/// token.cancel();
/// handle.await.unwrap();
/// # }
/// ```
pub struct JsonRpcClient {
    /// Label used in timeout errors and logs, normally the endpoint URL
    server: String,
    next_id: AtomicU64,
    pending: Mutex<PendingMap>,
    outbound_tx: mpsc::UnboundedSender<String>,
    notification_handlers: std::sync::Mutex<HashMap<String, NotificationHandler>>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("server", &self.server)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a client that writes serialized messages to `outbound_tx`
    pub fn new(server: impl Into<String>, outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            server: server.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound_tx,
            notification_handlers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Server label this client was created with
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Send a request and wait for its result
    ///
    /// # Errors
    ///
    /// - `ParleyError::McpTransport` if the outbound channel is closed or the
    ///   read loop stopped before a response arrived
    /// - `ParleyError::McpTimeout` if nothing arrives within `timeout`
    /// - `ParleyError::Mcp` if the server answers with an error object
    /// - `ParleyError::Serialization` if the result has the wrong shape
    pub async fn request<P, R>(&self, method: &str, params: P, timeout: Option<Duration>) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register before sending; a fast server could otherwise win the race.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ParleyError::McpTransport("outbound channel closed".to_string()).into());
        }

        tracing::debug!(server = %self.server, method, id, "MCP request sent");

        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ParleyError::McpTimeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                }
                .into());
            }
        };

        let rpc_result = outcome.map_err(|_| {
            ParleyError::McpTransport("connection closed before response arrived".to_string())
        })?;
        let value = rpc_result.map_err(|e| ParleyError::Mcp(e.to_string()))?;

        Ok(serde_json::from_value(value).map_err(ParleyError::Serialization)?)
    }

    /// Send a notification; no response is expected
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::McpTransport` if the outbound channel is closed
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": serde_json::to_value(params)?
        }))?;

        self.outbound_tx
            .send(message)
            .map_err(|_| ParleyError::McpTransport("outbound channel closed".to_string()))?;
        Ok(())
    }

    /// Register a handler for a server notification, replacing any previous one
    pub fn on_notification(
        &self,
        method: impl Into<String>,
        f: impl Fn(Value) + Send + Sync + 'static,
    ) {
        if let Ok(mut handlers) = self.notification_handlers.lock() {
            handlers.insert(method.into(), Box::new(f));
        }
    }

    /// Fail every in-flight request
    async fn fail_pending(&self) {
        self.pending.lock().await.clear();
    }
}

/// Run the inbound side of `client` as a background task
///
/// The loop ends when `cancellation` fires or the inbound channel closes;
/// either way every pending request is failed rather than left waiting.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_msg = inbound_rx.recv() => match maybe_msg {
                    Some(raw) => dispatch_message(&raw, &client).await,
                    None => {
                        tracing::debug!(server = %client.server, "MCP inbound channel closed");
                        break;
                    }
                },
            }
        }
        client.fail_pending().await;
    })
}

async fn dispatch_message(raw: &str, client: &JsonRpcClient) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(server = %client.server, "Ignoring unparseable MCP message: {}", e);
            return;
        }
    };

    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_method = value.get("method").is_some();
    let is_response = value.get("result").is_some() || value.get("error").is_some();

    match (has_id, has_method) {
        (true, false) if is_response => handle_response(value, client).await,
        (true, true) => handle_server_request(value, client),
        (false, true) => handle_notification(value, client),
        _ => tracing::debug!(server = %client.server, "Ignoring unclassifiable MCP message"),
    }
}

async fn handle_response(value: Value, client: &JsonRpcClient) {
    let id_val = &value["id"];
    let id = match id_val
        .as_u64()
        .or_else(|| id_val.as_str().and_then(|s| s.parse().ok()))
    {
        Some(id) => id,
        None => {
            tracing::warn!(server = %client.server, "MCP response has non-integer id: {}", id_val);
            return;
        }
    };

    let Some(tx) = client.pending.lock().await.remove(&id) else {
        tracing::debug!(server = %client.server, id, "MCP response for unknown id");
        return;
    };

    let outcome = match value.get("error") {
        Some(error_val) => Err(serde_json::from_value::<JsonRpcError>(error_val.clone())
            .unwrap_or_else(|_| JsonRpcError {
                code: -32603,
                message: format!("malformed error object: {}", error_val),
                data: None,
            })),
        None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
    };

    // The caller may already have timed out.
    let _ = tx.send(outcome);
}

/// Answer a server-initiated request; only `ping` is supported
fn handle_server_request(value: Value, client: &JsonRpcClient) {
    let method = value
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default();
    let id = value.get("id").cloned();

    let response = if method == METHOD_PING {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    } else {
        tracing::debug!(server = %client.server, method, "Rejecting unsupported server request");
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", method),
                data: None,
            }),
        }
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        let _ = client.outbound_tx.send(serialized);
    }
}

fn handle_notification(value: Value, client: &JsonRpcClient) {
    let Some(method) = value.get("method").and_then(|m| m.as_str()) else {
        return;
    };
    let params = value.get("params").cloned().unwrap_or(Value::Null);

    let Ok(handlers) = client.notification_handlers.lock() else {
        return;
    };
    match handlers.get(method) {
        Some(handler) => handler(params),
        None => tracing::trace!(server = %client.server, method, "Unhandled MCP notification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn make_client() -> (
        Arc<JsonRpcClient>,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
        CancellationToken,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let token = CancellationToken::new();
        let client = Arc::new(JsonRpcClient::new("test-server", out_tx));
        start_read_loop(in_rx, token.clone(), Arc::clone(&client));
        (client, out_rx, in_tx, token)
    }

    /// Answer every outbound request with `respond(request)`
    fn spawn_responder(
        mut out_rx: mpsc::UnboundedReceiver<String>,
        in_tx: mpsc::UnboundedSender<String>,
        respond: impl Fn(&Value) -> Value + Send + 'static,
    ) {
        tokio::spawn(async move {
            while let Some(raw) = out_rx.recv().await {
                let req: Value = serde_json::from_str(&raw).unwrap();
                if req.get("id").is_none() {
                    continue;
                }
                let _ = in_tx.send(respond(&req).to_string());
            }
        });
    }

    #[tokio::test]
    async fn test_request_resolves_with_result() {
        let (client, out_rx, in_tx, _token) = make_client();
        spawn_responder(out_rx, in_tx, |req| {
            serde_json::json!({"jsonrpc": "2.0", "id": req["id"], "result": {"tools": []}})
        });

        let result: Value = client
            .request("tools/list", serde_json::json!({}), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(result["tools"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_request_timeout_names_server_and_method() {
        let (client, _out_rx, _in_tx, _token) = make_client();

        let err = client
            .request::<_, Value>("tools/list", serde_json::json!({}), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();

        match err.downcast_ref::<ParleyError>() {
            Some(ParleyError::McpTimeout { server, method }) => {
                assert_eq!(server, "test-server");
                assert_eq!(method, "tools/list");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_maps_to_mcp_error() {
        let (client, out_rx, in_tx, _token) = make_client();
        spawn_responder(out_rx, in_tx, |req| {
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": -32602, "message": "Unknown tool: nope"}
            })
        });

        let err = client
            .request::<_, Value>("tools/call", serde_json::json!({"name": "nope"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ParleyError>(), Some(ParleyError::Mcp(_))));
        assert!(err.to_string().contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_string_ids_are_matched() {
        let (client, out_rx, in_tx, _token) = make_client();
        spawn_responder(out_rx, in_tx, |req| {
            let id = req["id"].as_u64().unwrap().to_string();
            serde_json::json!({"jsonrpc": "2.0", "id": id, "result": "ok"})
        });

        let result: String = client.request("x", serde_json::json!({}), None).await.unwrap();
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_distinct_ids() {
        let (client, out_rx, in_tx, _token) = make_client();
        spawn_responder(out_rx, in_tx, |req| {
            serde_json::json!({"jsonrpc": "2.0", "id": req["id"], "result": {"echo": req["id"]}})
        });

        let (r1, r2, r3) = tokio::join!(
            client.request::<_, Value>("a", serde_json::json!({}), None),
            client.request::<_, Value>("b", serde_json::json!({}), None),
            client.request::<_, Value>("c", serde_json::json!({}), None),
        );
        let ids: std::collections::HashSet<u64> = [r1.unwrap(), r2.unwrap(), r3.unwrap()]
            .into_iter()
            .map(|v| v["echo"].as_u64().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_fails_pending_request() {
        let (client, _out_rx, _in_tx, token) = make_client();

        let c = Arc::clone(&client);
        let task = tokio::spawn(async move {
            c.request::<_, Value>("slow", serde_json::json!({}), Some(Duration::from_secs(10)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("request did not finish after cancellation")
            .unwrap();
        assert!(matches!(
            outcome.unwrap_err().downcast_ref::<ParleyError>(),
            Some(ParleyError::McpTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_server_ping_is_answered() {
        let (_client, mut out_rx, in_tx, _token) = make_client();
        in_tx
            .send(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#.to_string())
            .unwrap();

        let raw = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let reply: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply["id"], "srv-1");
        assert_eq!(reply["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_unknown_server_request_gets_method_not_found() {
        let (_client, mut out_rx, in_tx, _token) = make_client();
        in_tx
            .send(r#"{"jsonrpc":"2.0","id":7,"method":"sampling/createMessage","params":{}}"#.to_string())
            .unwrap();

        let raw = out_rx.recv().await.unwrap();
        let reply: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_notification_handler_called() {
        let (client, _out_rx, in_tx, _token) = make_client();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        client.on_notification("notifications/tools/list_changed", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        in_tx
            .send(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#.to_string())
            .unwrap();
        in_tx.send("not json".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_omits_id() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let client = JsonRpcClient::new("s", out_tx);
        client
            .notify("notifications/initialized", serde_json::json!({}))
            .unwrap();

        let val: Value = serde_json::from_str(&out_rx.try_recv().unwrap()).unwrap();
        assert_eq!(val["method"], "notifications/initialized");
        assert!(val.get("id").is_none());
    }

    #[test]
    fn test_notify_fails_when_channel_closed() {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        drop(out_rx);
        let client = JsonRpcClient::new("s", out_tx);
        assert!(client.notify("x", serde_json::json!({})).is_err());
    }
}
