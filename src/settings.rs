//! User settings over the on-device store
//!
//! Saving MCP endpoints, saving a provider key, and picking the active
//! provider from the providers the user has keys for.

use crate::error::{ParleyError, Result};
use crate::providers::ProviderKind;
use crate::storage::{
    api_key_store_key, get_non_empty, KeyValueStore, HTTP_URL_KEY, PROVIDER_KEY, SSE_URL_KEY,
};

/// Saved MCP endpoints; `None` when not configured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpSettings {
    pub http_url: Option<String>,
    pub sse_url: Option<String>,
}

/// True for an empty string or a parseable absolute URL
///
/// # Examples
///
/// ```
/// use parley::settings::validate_url;
///
/// assert!(validate_url(""));
/// assert!(validate_url("https://tools.example.com/mcp"));
/// assert!(!validate_url("tools.example.com"));
/// ```
pub fn validate_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url::Url::parse(url).is_ok()
}

/// Read both MCP endpoints
pub fn load_mcp_settings(store: &dyn KeyValueStore) -> Result<McpSettings> {
    Ok(McpSettings {
        http_url: get_non_empty(store, HTTP_URL_KEY)?,
        sse_url: get_non_empty(store, SSE_URL_KEY)?,
    })
}

/// Validate and store both MCP endpoints
///
/// Nothing is written unless both URLs are valid.
///
/// # Errors
///
/// `ParleyError::InvalidEndpointUrl` naming the first invalid URL
pub fn save_mcp_settings(store: &dyn KeyValueStore, http_url: &str, sse_url: &str) -> Result<()> {
    for url in [http_url, sse_url] {
        if !validate_url(url) {
            return Err(ParleyError::InvalidEndpointUrl(url.trim().to_string()).into());
        }
    }

    store.multi_set(&[
        (HTTP_URL_KEY.to_string(), http_url.trim().to_string()),
        (SSE_URL_KEY.to_string(), sse_url.trim().to_string()),
    ])?;
    tracing::info!("MCP settings saved");
    Ok(())
}

/// Remove both MCP endpoints
pub fn reset_mcp_settings(store: &dyn KeyValueStore) -> Result<()> {
    store.multi_remove(&[HTTP_URL_KEY.to_string(), SSE_URL_KEY.to_string()])?;
    tracing::info!("MCP settings reset");
    Ok(())
}

/// Short description of which endpoints are configured
///
/// # Examples
///
/// ```
/// use parley::settings::mcp_status;
///
/// assert_eq!(mcp_status("http://a/mcp", ""), Some("HTTP endpoint configured"));
/// assert_eq!(mcp_status(" ", ""), None);
/// ```
pub fn mcp_status(http_url: &str, sse_url: &str) -> Option<&'static str> {
    match (!http_url.trim().is_empty(), !sse_url.trim().is_empty()) {
        (true, true) => Some("Both HTTP and SSE endpoints configured"),
        (true, false) => Some("HTTP endpoint configured"),
        (false, true) => Some("SSE endpoint configured"),
        (false, false) => None,
    }
}

/// Store `provider` as the active provider together with its key
///
/// # Errors
///
/// `ParleyError::InvalidApiKey` when the key is blank; nothing is stored
pub fn save_provider_settings(
    store: &dyn KeyValueStore,
    provider: ProviderKind,
    api_key: &str,
) -> Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ParleyError::InvalidApiKey.into());
    }

    store.multi_set(&[
        (PROVIDER_KEY.to_string(), provider.name().to_string()),
        (api_key_store_key(provider.name()), api_key.to_string()),
    ])?;
    tracing::info!("Saved settings for provider {}", provider);
    Ok(())
}

/// Providers with a stored, non-empty key, in display order
///
/// A failed read for one provider is logged and that provider skipped.
pub fn available_providers(store: &dyn KeyValueStore) -> Vec<ProviderKind> {
    ProviderKind::ALL
        .into_iter()
        .filter(|kind| {
            match get_non_empty(store, &api_key_store_key(kind.name())) {
                Ok(key) => key.is_some(),
                Err(e) => {
                    tracing::warn!("Failed to read API key for {}: {}", kind, e);
                    false
                }
            }
        })
        .collect()
}

/// Provider to use when none is requested
///
/// The stored provider if it still has a key; otherwise the first provider
/// that has one, which is then saved as the active provider.
///
/// # Errors
///
/// Returns the store error if reading or saving the selection fails
pub fn active_provider(store: &dyn KeyValueStore) -> Result<Option<ProviderKind>> {
    let available = available_providers(store);
    let stored = get_non_empty(store, PROVIDER_KEY)?.and_then(|n| ProviderKind::from_name(&n));

    if let Some(kind) = stored.filter(|k| available.contains(k)) {
        return Ok(Some(kind));
    }

    match available.first() {
        Some(first) => {
            store.set(PROVIDER_KEY, first.name())?;
            tracing::debug!("Active provider set to {}", first);
            Ok(Some(*first))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, MockKeyValueStore};

    #[test]
    fn test_validate_url() {
        assert!(validate_url(""));
        assert!(validate_url("   "));
        assert!(validate_url("http://localhost:3000/mcp"));
        assert!(!validate_url("not a url"));
        assert!(!validate_url("/relative/path"));
    }

    #[test]
    fn test_save_mcp_settings_trims_and_stores() {
        let store = MemoryStore::new();
        save_mcp_settings(&store, " https://a.example/mcp ", "").unwrap();

        let saved = load_mcp_settings(&store).unwrap();
        assert_eq!(saved.http_url.as_deref(), Some("https://a.example/mcp"));
        assert_eq!(saved.sse_url, None);
        assert_eq!(store.get(SSE_URL_KEY).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_invalid_url_leaves_store_untouched() {
        let store = MemoryStore::new();
        save_mcp_settings(&store, "https://old/mcp", "https://old/sse").unwrap();

        let err = save_mcp_settings(&store, "https://new/mcp", "nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::InvalidEndpointUrl(u)) if u == "nope"
        ));
        assert_eq!(
            load_mcp_settings(&store).unwrap().http_url.as_deref(),
            Some("https://old/mcp")
        );
    }

    #[test]
    fn test_reset_mcp_settings() {
        let store = MemoryStore::new();
        save_mcp_settings(&store, "https://a/mcp", "https://a/sse").unwrap();
        reset_mcp_settings(&store).unwrap();
        assert_eq!(load_mcp_settings(&store).unwrap(), McpSettings::default());
    }

    #[test]
    fn test_mcp_status_variants() {
        assert_eq!(
            mcp_status("http://a", "http://b"),
            Some("Both HTTP and SSE endpoints configured")
        );
        assert_eq!(mcp_status("", "http://b"), Some("SSE endpoint configured"));
        assert_eq!(mcp_status("", ""), None);
    }

    #[test]
    fn test_save_provider_settings() {
        let store = MemoryStore::new();
        save_provider_settings(&store, ProviderKind::Mistral, "  mk-1 ").unwrap();
        assert_eq!(store.get(PROVIDER_KEY).unwrap().as_deref(), Some("Mistral"));
        assert_eq!(store.get("mistral_api_key").unwrap().as_deref(), Some("mk-1"));

        let err = save_provider_settings(&store, ProviderKind::Groq, "   ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParleyError>(),
            Some(ParleyError::InvalidApiKey)
        ));
        assert_eq!(store.get(PROVIDER_KEY).unwrap().as_deref(), Some("Mistral"));
    }

    #[test]
    fn test_available_and_active_provider() {
        let store = MemoryStore::new();
        assert!(available_providers(&store).is_empty());
        assert_eq!(active_provider(&store).unwrap(), None);

        store.set("deepseek_api_key", "ds").unwrap();
        store.set("anthropic_api_key", "ant").unwrap();
        store.set("groq_api_key", " ").unwrap();
        assert_eq!(
            available_providers(&store),
            vec![ProviderKind::Anthropic, ProviderKind::DeepSeek]
        );

        // Stored provider without a key falls back to the first available one
        store.set(PROVIDER_KEY, "Groq").unwrap();
        assert_eq!(active_provider(&store).unwrap(), Some(ProviderKind::Anthropic));
        assert_eq!(store.get(PROVIDER_KEY).unwrap().as_deref(), Some("Anthropic"));

        store.set(PROVIDER_KEY, "DeepSeek").unwrap();
        assert_eq!(active_provider(&store).unwrap(), Some(ProviderKind::DeepSeek));
    }

    #[test]
    fn test_available_providers_skips_failed_reads() {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|key| {
            if key == "openai_api_key" {
                Err(ParleyError::Storage("disk on fire".into()).into())
            } else if key == "google_api_key" {
                Ok(Some("g".to_string()))
            } else {
                Ok(None)
            }
        });
        assert_eq!(available_providers(&store), vec![ProviderKind::Google]);
    }
}
