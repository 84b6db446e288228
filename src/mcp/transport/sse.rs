//! Legacy HTTP+SSE transport
//!
//! The client opens a GET event stream. The server's first `endpoint` event
//! carries the URL (often relative, with a session query string) that every
//! outbound message is POSTed to. Replies arrive on the stream as `message`
//! events.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ParleyError, Result};
use crate::mcp::transport::{channel_stream, Transport};
use crate::sse::decode_stream;

/// HTTP+SSE transport bound to one event stream
#[derive(Debug)]
pub struct SseTransport {
    http_client: reqwest::Client,
    sse_url: url::Url,
    post_url: url::Url,
    request_timeout: Duration,
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    error_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    cancellation: CancellationToken,
}

impl SseTransport {
    /// Open the event stream and wait for the server's `endpoint` event
    ///
    /// `timeout` bounds the wait for the endpoint event and every later POST;
    /// the stream itself stays open until [`Transport::close`] or drop.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::McpTransport` if the stream cannot be opened or
    /// ends before naming an endpoint, and `ParleyError::McpTimeout` if no
    /// endpoint event arrives in time
    pub async fn connect(sse_url: url::Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ParleyError::McpTransport(format!("Failed to create HTTP client: {}", e)))?;

        let response = tokio::time::timeout(
            timeout,
            http_client
                .get(sse_url.as_str())
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| ParleyError::McpTimeout {
            server: sse_url.to_string(),
            method: "GET".to_string(),
        })?
        .map_err(|e| ParleyError::McpTransport(format!("SSE GET failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ParleyError::McpTransport(format!(
                "SSE GET returned status {}",
                response.status()
            ))
            .into());
        }

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let cancellation = CancellationToken::new();

        tokio::spawn(read_events(
            response.bytes_stream(),
            endpoint_tx,
            response_tx,
            error_tx,
            cancellation.clone(),
        ));

        let endpoint = match tokio::time::timeout(timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                cancellation.cancel();
                return Err(ParleyError::McpTransport(
                    "SSE stream ended before an endpoint event".to_string(),
                )
                .into());
            }
            Err(_) => {
                cancellation.cancel();
                return Err(ParleyError::McpTimeout {
                    server: sse_url.to_string(),
                    method: "endpoint".to_string(),
                }
                .into());
            }
        };

        let post_url = sse_url.join(endpoint.trim())?;
        if post_url.origin() != sse_url.origin() {
            cancellation.cancel();
            return Err(ParleyError::McpTransport(format!(
                "SSE endpoint {} is not on the same origin as {}",
                post_url, sse_url
            ))
            .into());
        }
        tracing::debug!(sse = %sse_url, post = %post_url, "SSE transport ready");

        Ok(Self {
            http_client,
            sse_url,
            post_url,
            request_timeout: timeout,
            response_rx: Arc::new(Mutex::new(response_rx)),
            error_rx: Arc::new(Mutex::new(error_rx)),
            cancellation,
        })
    }

    /// URL outbound messages are POSTed to
    pub fn post_url(&self) -> &url::Url {
        &self.post_url
    }
}

async fn read_events<S>(
    byte_stream: S,
    endpoint_tx: oneshot::Sender<String>,
    response_tx: mpsc::UnboundedSender<String>,
    error_tx: mpsc::UnboundedSender<String>,
    cancellation: CancellationToken,
) where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    let mut endpoint_tx = Some(endpoint_tx);
    let mut events = Box::pin(decode_stream(byte_stream));

    loop {
        let item = tokio::select! {
            _ = cancellation.cancelled() => break,
            item = events.next() => item,
        };
        let Some(item) = item else {
            break;
        };

        let event = match item {
            Ok(event) => event,
            Err(e) => {
                let _ = error_tx.send(format!("SSE stream error: {}", e));
                break;
            }
        };

        match event.event.as_deref() {
            Some("endpoint") => match endpoint_tx.take() {
                Some(tx) => {
                    let _ = tx.send(event.data);
                }
                None => tracing::debug!("Ignoring repeated SSE endpoint event"),
            },
            None | Some("message") => {
                if event.is_ping() || event.data.trim().is_empty() {
                    continue;
                }
                if response_tx.send(event.data).is_err() {
                    break;
                }
            }
            Some(other) => tracing::trace!(event = other, "Ignoring SSE event"),
        }
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: String) -> Result<()> {
        let response = self
            .http_client
            .post(self.post_url.as_str())
            .timeout(self.request_timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| ParleyError::McpTransport(format!("SSE POST failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ParleyError::McpTransport(format!(
                "SSE POST to {} returned status {}",
                self.post_url,
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    fn receive(&self) -> std::pin::Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.response_rx))
    }

    fn receive_err(&self) -> std::pin::Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        channel_stream(Arc::clone(&self.error_rx))
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(sse = %self.sse_url, "Closing SSE stream");
        self.cancellation.cancel();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn stream_server(body: &'static str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;
        server
    }

    fn sse_url(server: &MockServer) -> url::Url {
        url::Url::parse(&format!("{}/sse", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_connect_resolves_relative_endpoint_and_forwards_messages() {
        let server = stream_server(
            "event: endpoint\ndata: /messages?sessionId=abc\n\nevent: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n",
        )
        .await;

        let t = SseTransport::connect(sse_url(&server), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(t.post_url().path(), "/messages");
        assert_eq!(t.post_url().query(), Some("sessionId=abc"));

        let msg = tokio::time::timeout(Duration::from_secs(2), t.receive().next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }

    #[tokio::test]
    async fn test_send_posts_to_endpoint() {
        let server = stream_server("event: endpoint\ndata: /messages?sessionId=abc\n\n").await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(query_param("sessionId", "abc"))
            .and(body_string_contains("tools/list"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let t = SseTransport::connect(sse_url(&server), Duration::from_secs(2))
            .await
            .unwrap();
        t.send(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stream_without_endpoint_fails() {
        let server = stream_server("event: message\ndata: {}\n\n").await;
        let err = SseTransport::connect(sse_url(&server), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[tokio::test]
    async fn test_cross_origin_endpoint_rejected() {
        let server = stream_server("event: endpoint\ndata: http://evil.example/messages\n\n").await;
        let err = SseTransport::connect(sse_url(&server), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("same origin"));
    }

    #[tokio::test]
    async fn test_error_status_fails_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = SseTransport::connect(sse_url(&server), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::McpTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_read_events_skips_pings() {
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let body: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(
            b"event: endpoint\ndata: /m\n\nevent: ping\ndata: \n\ndata: {\"x\":1}\n\n",
        ))];

        read_events(
            futures::stream::iter(body),
            endpoint_tx,
            tx,
            err_tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(endpoint_rx.await.unwrap(), "/m");
        assert_eq!(rx.try_recv().unwrap(), r#"{"x":1}"#);
        assert!(rx.try_recv().is_err());
    }
}
