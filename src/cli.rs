//! Command-line interface definition for Parley
//!
//! This module defines the CLI structure using clap's derive API: chat and
//! one-shot ask, settings management, model listing and chat history.

use clap::{Parser, Subcommand};

/// Parley - tool-calling chat client for hosted LLMs
///
/// Chat with OpenAI, Anthropic, Google, Groq, Mistral, OpenRouter or
/// DeepSeek models, with built-in tools and tools from MCP servers.
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Settings store location (overrides config)
    #[arg(long)]
    pub store: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `chat` and `ask`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TurnArgs {
    /// Provider to use (defaults to the saved provider)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model id (defaults to the provider's default model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key for this session only
    #[arg(long, env = "PARLEY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// MCP streamable HTTP endpoint for this session only
    #[arg(long)]
    pub mcp_http: Option<String>,

    /// MCP SSE endpoint for this session only
    #[arg(long)]
    pub mcp_sse: Option<String>,

    /// Do not save the conversation to history
    #[arg(long)]
    pub ephemeral: bool,
}

/// Available commands for Parley
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat
    Chat {
        #[command(flatten)]
        turn: TurnArgs,

        /// Resume a saved chat by id or id prefix
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Send a single message and print the reply
    Ask {
        /// Message text
        text: String,

        #[command(flatten)]
        turn: TurnArgs,
    },

    /// Manage provider and MCP settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// List models
    Models {
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// List supported providers and which have keys
    Providers,

    /// Manage saved chats
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Save the active provider and its API key
    Provider {
        /// Provider name
        name: String,

        /// API key to store
        #[arg(long)]
        api_key: String,
    },

    /// Save MCP tool server endpoints (empty string clears one)
    Mcp {
        #[arg(long, default_value = "")]
        http: String,

        #[arg(long, default_value = "")]
        sse: String,
    },

    /// Remove both MCP endpoints
    ResetMcp,

    /// Show current settings
    Show,
}

/// Model subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List models offered by a provider
    List {
        /// Provider (defaults to the active provider)
        #[arg(short, long)]
        provider: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// History subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List saved chats
    List,

    /// Print a saved chat
    Show {
        /// Chat id or id prefix
        id: String,
    },

    /// Delete a saved chat
    Delete {
        /// Chat id or id prefix
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            store: None,
            command: Commands::Providers,
        }
    }
}
