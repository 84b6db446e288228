//! Configuration management for Parley
//!
//! Configuration is loaded from a YAML file, then overridden by `PARLEY_*`
//! environment variables, then by CLI flags. Every section has defaults so
//! an absent or partial file is fine.

use crate::error::{ParleyError, Result};
use crate::providers::{ProviderKind, UnknownProviderPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure for Parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// On-device storage locations
///
/// `None` selects the platform data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Settings store (sled) directory
    #[serde(default)]
    pub path: Option<String>,
    /// Chat history SQLite file
    #[serde(default)]
    pub history_path: Option<String>,
}

/// Provider construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider used when none is passed and none is saved
    #[serde(default = "default_provider_name")]
    pub default_provider: String,

    /// Per-request deadline for model calls
    #[serde(default = "default_provider_timeout")]
    pub request_timeout_seconds: u64,

    /// Handling of provider names Parley does not know
    #[serde(default)]
    pub unknown_provider_policy: UnknownProviderPolicy,

    /// API base URL overrides keyed by provider name
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

fn default_provider_name() -> String {
    ProviderKind::DEFAULT.name().to_string()
}

fn default_provider_timeout() -> u64 {
    120
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider_name(),
            request_timeout_seconds: default_provider_timeout(),
            unknown_provider_policy: UnknownProviderPolicy::default(),
            base_urls: HashMap::new(),
        }
    }
}

impl ProvidersConfig {
    /// Base URL for `kind`, honouring overrides (matched case-insensitively)
    pub fn base_url(&self, kind: ProviderKind) -> String {
        self.base_urls
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(kind.name()))
            .map(|(_, url)| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| kind.default_base_url().to_string())
    }
}

/// MCP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Deadline for connect, initialize, list and call requests
    #[serde(default = "default_mcp_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_mcp_timeout() -> u64 {
    30
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_mcp_timeout(),
        }
    }
}

/// Built-in tool settings
///
/// Keys left unset here are read from their usual environment variables
/// when the registry is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Device platform reported to the model; `web` disables places search
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Deadline for outbound tool HTTP requests
    #[serde(default = "default_tool_timeout")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub tmdb_api_key: Option<String>,
    #[serde(default)]
    pub google_maps_api_key: Option<String>,
    #[serde(default)]
    pub tavily_api_key: Option<String>,
    #[serde(default)]
    pub replicate_api_token: Option<String>,

    /// Upstream base URL overrides keyed by service
    /// (`open_meteo_geocoding`, `open_meteo_forecast`, `tmdb`, `google_places`,
    /// `tavily`, `replicate`)
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl ToolsConfig {
    /// Base URL for `service`, the configured override or `default`
    pub fn base_url(&self, service: &str, default: &str) -> String {
        self.base_urls
            .get(service)
            .map(String::as_str)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// True when the platform is the web build, which has no places search
    pub fn is_web(&self) -> bool {
        self.platform.eq_ignore_ascii_case("web")
    }
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            request_timeout_seconds: default_tool_timeout(),
            tmdb_api_key: None,
            google_maps_api_key: None,
            tavily_api_key: None,
            replicate_api_token: None,
            base_urls: HashMap::new(),
        }
    }
}

/// Chat turn settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum model round trips spent on tool calls in one turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_max_tool_rounds() -> usize {
    8
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider) = std::env::var("PARLEY_DEFAULT_PROVIDER") {
            self.providers.default_provider = provider;
        }

        if let Ok(timeout) = std::env::var("PARLEY_PROVIDER_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.providers.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid PARLEY_PROVIDER_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(policy) = std::env::var("PARLEY_UNKNOWN_PROVIDER_POLICY") {
            match policy.to_lowercase().as_str() {
                "fallback_to_default" | "fallback" => {
                    self.providers.unknown_provider_policy =
                        UnknownProviderPolicy::FallbackToDefault
                }
                "reject" => self.providers.unknown_provider_policy = UnknownProviderPolicy::Reject,
                _ => tracing::warn!("Invalid PARLEY_UNKNOWN_PROVIDER_POLICY: {}", policy),
            }
        }

        if let Ok(timeout) = std::env::var("PARLEY_MCP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.mcp.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid PARLEY_MCP_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(platform) = std::env::var("PARLEY_PLATFORM") {
            tracing::debug!(platform = %platform, "Env override: PARLEY_PLATFORM");
            self.tools.platform = platform;
        }

        if let Ok(rounds) = std::env::var("PARLEY_MAX_TOOL_ROUNDS") {
            match rounds.parse::<usize>() {
                Ok(v) => self.chat.max_tool_rounds = v,
                Err(_) => tracing::warn!("Invalid PARLEY_MAX_TOOL_ROUNDS: {}", rounds),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(store) = &cli.store {
            self.storage.path = Some(store.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Config` naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.providers.request_timeout_seconds == 0 {
            return Err(ParleyError::Config(
                "providers.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.mcp.request_timeout_seconds == 0 {
            return Err(ParleyError::Config(
                "mcp.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.tools.request_timeout_seconds == 0 {
            return Err(ParleyError::Config(
                "tools.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.max_tool_rounds == 0 || self.chat.max_tool_rounds > 100 {
            return Err(ParleyError::Config(
                "chat.max_tool_rounds must be between 1 and 100".to_string(),
            )
            .into());
        }

        if self.providers.unknown_provider_policy == UnknownProviderPolicy::Reject
            && ProviderKind::from_name(&self.providers.default_provider).is_none()
        {
            return Err(ParleyError::Config(format!(
                "providers.default_provider '{}' is not a supported provider",
                self.providers.default_provider
            ))
            .into());
        }

        for (name, url) in self
            .providers
            .base_urls
            .iter()
            .chain(self.tools.base_urls.iter())
        {
            if url::Url::parse(url).is_err() {
                return Err(
                    ParleyError::Config(format!("Invalid base URL for {}: {}", name, url)).into(),
                );
            }
        }

        Ok(())
    }
}
