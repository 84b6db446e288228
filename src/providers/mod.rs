//! Provider module for Parley
//!
//! This module contains the provider abstraction, the three wire-protocol
//! backends and the factory that picks one for a chat turn.

pub mod anthropic;
pub mod base;
pub mod catalog;
pub mod google;
pub mod kind;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use base::{
    validate_message_sequence, Completion, EventStream, FunctionCall, Message, ModelInfo,
    Provider, StreamEvent, TokenUsage, ToolCall,
};
pub use catalog::ModelCatalog;
pub use google::GeminiProvider;
pub use kind::{resolve_provider, ApiFamily, ProviderKind, UnknownProviderPolicy};
pub use openai::OpenAiCompatibleProvider;

use crate::config::ProvidersConfig;
use crate::credentials::CredentialResolver;
use crate::error::{ParleyError, Result};
use reqwest::Client;
use std::time::Duration;

/// Builds model clients for chat turns
///
/// Holds the shared HTTP client, the credential resolver and the provider
/// settings; [`ProviderFactory::build`] is cheap and is called once per turn.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    client: Client,
    resolver: CredentialResolver,
    config: ProvidersConfig,
}

impl ProviderFactory {
    /// Create a factory
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized
    pub fn new(config: ProvidersConfig, resolver: CredentialResolver) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            resolver,
            config,
        })
    }

    /// Provider kind selected by an optional name under the configured policy
    ///
    /// With no name the configured default provider is used.
    pub fn select(&self, provider_name: Option<&str>) -> Result<ProviderKind> {
        resolve_provider(
            Some(self.requested_name(provider_name)),
            self.config.unknown_provider_policy,
        )
    }

    fn requested_name<'a>(&'a self, provider_name: Option<&'a str>) -> &'a str {
        provider_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.config.default_provider.as_str())
    }

    /// Build a model client
    ///
    /// `api_key` wins over stored and environment keys when it is non-empty.
    /// `model_id` defaults to the provider's default model.
    ///
    /// An unknown name that falls back to the default backend still needs a
    /// key of its own: it is looked up in the store under the requested name
    /// and a missing one is reported against that name.
    ///
    /// # Errors
    ///
    /// - `ParleyError::MissingCredential` when no key can be found
    /// - `ParleyError::UnknownProvider` for unknown names under the reject
    ///   policy
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::ProvidersConfig;
    /// use parley::credentials::{env_from_map, CredentialResolver};
    /// use parley::providers::{Provider, ProviderFactory, ProviderKind};
    /// use parley::storage::MemoryStore;
    /// use std::sync::Arc;
    ///
    /// let resolver = CredentialResolver::new(
    ///     Arc::new(MemoryStore::new()),
    ///     env_from_map(Default::default()),
    /// );
    /// let factory = ProviderFactory::new(ProvidersConfig::default(), resolver).unwrap();
    /// let provider = factory.build(None, Some("Anthropic"), Some("sk-ant")).unwrap();
    /// assert_eq!(provider.kind(), ProviderKind::Anthropic);
    /// assert_eq!(provider.model(), "claude-3-haiku-20240307");
    /// ```
    pub fn build(
        &self,
        model_id: Option<&str>,
        provider_name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Box<dyn Provider>> {
        let kind = self.select(provider_name)?;
        let requested = self.requested_name(provider_name);
        let listed = requested.trim().is_empty() || ProviderKind::from_name(requested).is_some();

        let api_key = match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None if listed => self
                .resolver
                .resolve(kind)
                .ok_or_else(|| ParleyError::MissingCredential(kind.name().to_string()))?,
            None => self
                .resolver
                .resolve_stored(requested)
                .ok_or_else(|| ParleyError::MissingCredential(requested.to_string()))?,
        };

        let model = model_id
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| kind.default_model())
            .to_string();

        Ok(create_provider(
            kind,
            self.client.clone(),
            api_key,
            self.config.base_url(kind),
            model,
        ))
    }
}

/// Source of model clients for chat turns
///
/// Implemented by [`ProviderFactory`]; tests substitute scripted providers.
pub trait BuildProvider: Send + Sync {
    /// Build a model client, see [`ProviderFactory::build`]
    fn build_provider(
        &self,
        model_id: Option<&str>,
        provider_name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Box<dyn Provider>>;
}

impl BuildProvider for ProviderFactory {
    fn build_provider(
        &self,
        model_id: Option<&str>,
        provider_name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Box<dyn Provider>> {
        self.build(model_id, provider_name, api_key)
    }
}

/// Construct the backend for `kind`
pub fn create_provider(
    kind: ProviderKind,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
) -> Box<dyn Provider> {
    match kind.api_family() {
        ApiFamily::OpenAiCompatible => Box::new(OpenAiCompatibleProvider::new(
            kind, client, api_key, base_url, model,
        )),
        ApiFamily::Anthropic => Box::new(AnthropicProvider::new(client, api_key, base_url, model)),
        ApiFamily::Gemini => Box::new(GeminiProvider::new(client, api_key, base_url, model)),
    }
}
