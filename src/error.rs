//! Error types for Parley
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Parley operations
///
/// Only [`ParleyError::MissingCredential`] (and [`ParleyError::UnknownProvider`]
/// under the reject policy) ends a chat turn. Tool source and tool execution
/// failures are caught close to where they happen and degrade the turn
/// instead of failing it.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (API calls, stream decoding, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// No usable API key for the selected provider
    #[error("API key for provider {0} is required. Please configure it in Settings → AI Provider or set the corresponding environment variable.")]
    MissingCredential(String),

    /// Provider name not recognised and the reject policy is active
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A remote tool server could not be connected or listed
    #[error("Tool source unavailable at {endpoint}: {reason}")]
    ToolSourceUnavailable {
        /// Endpoint URL that failed
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// An individual tool invocation failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// An endpoint URL failed validation at settings-save time
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    /// An API key was empty at settings-save time
    #[error("API key must not be empty")]
    InvalidApiKey,

    /// Settings and chat history storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// MCP protocol level error returned by a server
    #[error("MCP error: {0}")]
    Mcp(String),

    /// MCP transport failure (connection, HTTP status, closed channel)
    #[error("MCP transport error: {0}")]
    McpTransport(String),

    /// No response to an MCP request before its deadline
    #[error("MCP timeout: server={server}, method={method}")]
    McpTimeout {
        /// Server label or endpoint
        server: String,
        /// JSON-RPC method that timed out
        method: String,
    },

    /// Server negotiated a protocol revision this client does not speak
    #[error("MCP protocol version mismatch: expected one of {expected:?}, got {got}")]
    McpProtocolVersion {
        /// Versions this client supports
        expected: Vec<String>,
        /// Version the server selected
        got: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    ///
    /// Built through the `From` impl, which drops the request URL; several
    /// services take their API key as a query parameter.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Settings store errors
    #[error("Settings store error: {0}")]
    Sled(#[from] sled::Error),

    /// Chat history database errors
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ParleyError {
    fn from(err: reqwest::Error) -> Self {
        ParleyError::Http(err.without_url())
    }
}

/// Result type alias for Parley operations
///
/// Uses `anyhow::Error` so callers can attach context while still being able
/// to `downcast_ref::<ParleyError>()` for the cases that matter.
pub type Result<T> = anyhow::Result<T>;
