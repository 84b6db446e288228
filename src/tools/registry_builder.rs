//! Built-in tool registry builder
//!
//! Builds the registry of tools that need no tool server: weather, media,
//! the calculator and, depending on the platform and the keys available,
//! places search, Tavily search and Replicate image generation.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ToolsConfig;
use crate::credentials::{process_env, EnvLookup};
use crate::error::Result;
use crate::tools::calculator::calculator_tools;
use crate::tools::image::{ImageTool, DEFAULT_REPLICATE_URL};
use crate::tools::media::{MediaTool, DEFAULT_TMDB_URL};
use crate::tools::places::{PlacesTool, DEFAULT_PLACES_URL};
use crate::tools::search::{tavily_tools, DEFAULT_TAVILY_URL};
use crate::tools::weather::{WeatherTool, DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL};
use crate::tools::{http_client, ToolRegistry};

pub const TMDB_API_KEY_ENV: &str = "TMDB_API_KEY";
pub const GOOGLE_MAPS_API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";
pub const REPLICATE_API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

/// Longest a Replicate prediction is polled before giving up
const IMAGE_MAX_WAIT: Duration = Duration::from_secs(120);

/// Builder for the built-in part of a turn's tool registry
///
/// # Examples
///
/// ```
/// use parley::config::ToolsConfig;
/// use parley::tools::ToolRegistryBuilder;
///
/// let registry = ToolRegistryBuilder::new(ToolsConfig::default()).build().unwrap();
/// assert!(registry.contains("get_weather"));
/// assert!(registry.contains("isPrime"));
/// ```
#[derive(Clone)]
pub struct ToolRegistryBuilder {
    tools_config: ToolsConfig,
    env: EnvLookup,
}

impl std::fmt::Debug for ToolRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistryBuilder")
            .field("platform", &self.tools_config.platform)
            .finish_non_exhaustive()
    }
}

impl ToolRegistryBuilder {
    /// Builder reading unset keys from the process environment
    pub fn new(tools_config: ToolsConfig) -> Self {
        Self {
            tools_config,
            env: process_env(),
        }
    }

    /// Read unset keys through `env` instead of the process environment
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Configured key, else the environment variable; blank counts as unset
    fn key(&self, configured: Option<&String>, env_var: &str) -> Option<String> {
        configured
            .cloned()
            .or_else(|| (self.env)(env_var))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Build the registry of built-in tools
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created
    pub fn build(&self) -> Result<ToolRegistry> {
        let cfg = &self.tools_config;
        let client = http_client(Duration::from_secs(cfg.request_timeout_seconds))?;
        let mut registry = ToolRegistry::new();

        registry.register(Arc::new(WeatherTool::new(
            client.clone(),
            cfg.base_url("open_meteo_geocoding", DEFAULT_GEOCODING_URL),
            cfg.base_url("open_meteo_forecast", DEFAULT_FORECAST_URL),
        )));
        registry.register(Arc::new(MediaTool::new(
            client.clone(),
            cfg.base_url("tmdb", DEFAULT_TMDB_URL),
            self.key(cfg.tmdb_api_key.as_ref(), TMDB_API_KEY_ENV),
        )));
        for tool in calculator_tools() {
            registry.register(tool);
        }

        if cfg.is_web() {
            tracing::debug!("Platform is web; places search disabled");
        } else {
            registry.register(Arc::new(PlacesTool::new(
                client.clone(),
                cfg.base_url("google_places", DEFAULT_PLACES_URL),
                self.key(cfg.google_maps_api_key.as_ref(), GOOGLE_MAPS_API_KEY_ENV),
            )));
        }

        if let Some(key) = self.key(cfg.tavily_api_key.as_ref(), TAVILY_API_KEY_ENV) {
            let base = cfg.base_url("tavily", DEFAULT_TAVILY_URL);
            for tool in tavily_tools(client.clone(), &base, &key) {
                registry.register(tool);
            }
        }

        if let Some(token) = self.key(cfg.replicate_api_token.as_ref(), REPLICATE_API_TOKEN_ENV) {
            registry.register(Arc::new(ImageTool::new(
                client,
                cfg.base_url("replicate", DEFAULT_REPLICATE_URL),
                token,
                IMAGE_MAX_WAIT,
            )));
        }

        tracing::debug!(count = registry.len(), "Built-in tools registered");
        Ok(registry)
    }
}
