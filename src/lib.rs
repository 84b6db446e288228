//! Parley - tool-calling chat client library
//!
//! This library drives chat turns against hosted LLM providers, with
//! built-in tools and tools discovered on remote MCP servers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Conversation state, display model and the turn orchestrator
//! - `providers`: Provider kinds, wire-protocol backends and model catalog
//! - `tools`: Built-in tools, the remote tool adapter and tool aggregation
//! - `mcp`: MCP client over streamable HTTP and legacy SSE
//! - `storage`: Key-value settings store and SQLite chat history
//! - `settings`: Provider and endpoint settings over the store
//! - `credentials`: API key lookup across store and environment
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use parley::chat::{ChatState, Orchestrator, SubmitRequest};
//! use parley::storage::SledStore;
//! use parley::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(SledStore::open_default(None)?);
//!     let orchestrator = Orchestrator::new(&config, store)?;
//!
//!     let outcome = orchestrator
//!         .submit(&ChatState::new(), SubmitRequest::new("What's the weather in Oslo?"))
//!         .await?;
//!     println!("{}", outcome.result.display.text());
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod settings;
pub mod sse;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use chat::{ChatState, Orchestrator, SubmitRequest, TurnOutcome, TurnResult};
pub use config::Config;
pub use error::{ParleyError, Result};
