//! Shared fixtures for integration tests
//!
//! [`McpTestServer`] is a small axum MCP server speaking both transports:
//! streamable HTTP on `/mcp` and legacy SSE on `/sse` (POSTs go to
//! `/messages`). Each side serves `get_weather` plus a `<side>_echo` tool.

use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[derive(Clone, Default)]
struct ServerState {
    deletes: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<String>>>,
    sse_tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

/// Handle to a running test server
#[allow(dead_code)]
pub struct McpTestServer {
    pub base: String,
    state: ServerState,
}

#[allow(dead_code)]
impl McpTestServer {
    pub fn http_url(&self) -> String {
        format!("{}/mcp", self.base)
    }

    pub fn sse_url(&self) -> String {
        format!("{}/sse", self.base)
    }

    /// Number of session DELETEs received on `/mcp`
    pub fn deletes(&self) -> usize {
        self.state.deletes.load(Ordering::SeqCst)
    }

    /// Names of tools called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().expect("calls lock").clone()
    }
}

#[allow(dead_code)]
pub async fn start_mcp_server() -> McpTestServer {
    let state = ServerState::default();
    let app = Router::new()
        .route("/mcp", post(http_rpc).delete(http_delete))
        .route("/sse", get(sse_stream))
        .route("/messages", post(sse_post))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    McpTestServer {
        base: format!("http://{}", addr),
        state,
    }
}

async fn http_rpc(State(state): State<ServerState>, Json(request): Json<Value>) -> Response {
    match handle_rpc(&state, "http", &request) {
        Some(reply) => ([("MCP-Session-Id", "test-session")], Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn http_delete(State(state): State<ServerState>) -> StatusCode {
    state.deletes.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn sse_stream(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    *state.sse_tx.lock().expect("sse lock") = Some(tx);

    let endpoint = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().event("endpoint").data("/messages?session=1"))
    });
    let messages = UnboundedReceiverStream::new(rx)
        .map(|message| Ok::<_, Infallible>(Event::default().event("message").data(message)));
    Sse::new(endpoint.chain(messages))
}

async fn sse_post(State(state): State<ServerState>, Json(request): Json<Value>) -> StatusCode {
    if let Some(reply) = handle_rpc(&state, "sse", &request) {
        if let Some(tx) = state.sse_tx.lock().expect("sse lock").as_ref() {
            let _ = tx.send(reply.to_string());
        }
    }
    StatusCode::ACCEPTED
}

fn text_content(text: impl Into<String>, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}],
        "isError": is_error,
    })
}

/// JSON-RPC reply for `request`; `None` for notifications
fn handle_rpc(state: &ServerState, side: &str, request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let method = request["method"].as_str().unwrap_or_default();
    let params = &request["params"];

    let result = match method {
        "initialize" => json!({
            "protocolVersion": params["protocolVersion"].as_str().unwrap_or("2025-06-18"),
            "capabilities": {"tools": {}},
            "serverInfo": {"name": format!("{}-test-server", side), "version": "0.1.0"},
        }),
        "ping" => json!({}),
        "tools/list" => json!({
            "tools": [
                {
                    "name": "get_weather",
                    "description": format!("Weather from the {} test server", side),
                    "inputSchema": {
                        "type": "object",
                        "properties": {"city": {"type": "string"}},
                        "required": ["city"],
                    },
                },
                {
                    "name": format!("{}_echo", side),
                    "description": "Echo text back",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                    },
                },
            ]
        }),
        "tools/call" => {
            let name = params["name"].as_str().unwrap_or_default().to_string();
            state.calls.lock().expect("calls lock").push(name.clone());
            let args = &params["arguments"];
            if name == "get_weather" {
                text_content(
                    format!("Sunny in {} ({})", args["city"].as_str().unwrap_or("?"), side),
                    false,
                )
            } else if name == format!("{}_echo", side) {
                text_content(args["text"].as_str().unwrap_or_default(), false)
            } else {
                text_content(format!("Unknown tool: {}", name), true)
            }
        }
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"},
            }))
        }
    };

    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}
