//! MCP (Model Context Protocol) client for remote tool servers
//!
//! Parley only consumes tools: it performs the `initialize` handshake, lists
//! tools and calls them. Two transports are supported, streamable HTTP and
//! the older HTTP+SSE pairing.
//!
//! # Module Layout
//!
//! - `types`      -- JSON-RPC primitives and the MCP tool types
//! - `client`     -- channel-backed JSON-RPC 2.0 client
//! - `protocol`   -- initialize / tools lifecycle over the client
//! - `transport`  -- `Transport` trait with HTTP and SSE implementations
//! - `connection` -- a live session bundling all of the above

pub mod client;
pub mod connection;
pub mod protocol;
pub mod transport;
pub mod types;

pub use connection::{EndpointKind, McpConnection};
pub use types::{CallToolResponse, McpTool};
