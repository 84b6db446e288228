//! API key resolution
//!
//! A provider's key comes from the on-device store first and from the
//! provider's environment variable second. Nothing is cached; every call
//! re-reads the store so a key saved mid-session is picked up on the next
//! turn.

use crate::providers::ProviderKind;
use crate::storage::{api_key_store_key, KeyValueStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Source of environment variables
///
/// The process environment in production; a fixed map in tests so they do
/// not have to mutate global state.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup reading the real process environment
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Lookup answering from a fixed map
pub fn env_from_map(vars: HashMap<String, String>) -> EnvLookup {
    Arc::new(move |name| vars.get(name).cloned())
}

/// Resolves provider API keys from the store, then the environment
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn KeyValueStore>,
    env: EnvLookup,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, env: EnvLookup) -> Self {
        Self { store, env }
    }

    /// Resolver over `store` and the process environment
    pub fn with_process_env(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, process_env())
    }

    /// Key for `provider`, or `None` when neither source has a non-empty one
    ///
    /// A failing store read is logged and treated as "not stored".
    pub fn resolve(&self, provider: ProviderKind) -> Option<String> {
        if let Some(stored) = self.resolve_stored(provider.name()) {
            return Some(stored);
        }

        let from_env = (self.env)(provider.env_var())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if from_env.is_some() {
            tracing::debug!("Using {} for {}", provider.env_var(), provider);
        }
        from_env
    }

    /// Stored key for a provider name, known or not
    ///
    /// Names outside [`ProviderKind`] have no environment variable, so this
    /// is their only source.
    pub fn resolve_stored(&self, provider_name: &str) -> Option<String> {
        match self.store.get(&api_key_store_key(provider_name)) {
            Ok(Some(stored)) => {
                let stored = stored.trim();
                if !stored.is_empty() {
                    tracing::debug!("Using stored API key for {}", provider_name);
                    return Some(stored.to_string());
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    "Failed to get API key from storage for {}: {}",
                    provider_name,
                    e
                );
                None
            }
        }
    }

    /// Read an arbitrary environment variable through the same lookup
    pub fn env(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.trim().is_empty())
    }
}
