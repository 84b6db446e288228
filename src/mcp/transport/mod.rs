//! MCP transports
//!
//! A [`Transport`] moves serialized JSON-RPC messages between the client and
//! a tool server. Two network transports are provided:
//!
//! - [`http::HttpTransport`]: streamable HTTP. Every message is a POST; the
//!   reply is a JSON body, an SSE body or `202 Accepted`.
//! - [`sse::SseTransport`]: the older HTTP+SSE transport. A long-lived GET
//!   stream delivers replies; its first `endpoint` event names the URL that
//!   outbound messages are POSTed to.
//!
//! Framing and session handling belong to each implementation.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// Message transport between a JSON-RPC client and an MCP server
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Deliver one complete JSON-RPC message to the server
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::McpTransport` when the message could not be
    /// delivered
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound JSON-RPC message strings, one per logical message
    ///
    /// The stream ends when the transport is closed or the server goes away.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Stream of transport diagnostics; never treated as errors
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Record the protocol revision agreed during `initialize`
    fn set_protocol_version(&self, _version: &str) {}

    /// End the session with the server
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub mod http;
pub mod sse;

#[cfg(test)]
pub mod fake;

/// Shared `receive()` implementation over a mutex-guarded receiver
pub(crate) fn channel_stream(
    rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<String>>>,
) -> Pin<Box<dyn Stream<Item = String> + Send + 'static>> {
    Box::pin(futures::stream::unfold(rx, |rx| async move {
        let item = rx.lock().await.recv().await?;
        Some((item, rx))
    }))
}
