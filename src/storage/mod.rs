//! On-device persistence for Parley
//!
//! Two stores live here:
//!
//! - a string key-value store ([`KeyValueStore`]) holding the user's
//!   settings: the selected provider, per-provider API keys and the MCP
//!   endpoint URLs. [`SledStore`] persists it on disk; [`MemoryStore`] keeps
//!   it in process.
//! - a SQLite chat history ([`ChatHistory`]) holding finished conversation
//!   states so a chat can be listed and resumed.

use crate::error::{ParleyError, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub mod history;
pub mod memory;
pub mod sled_store;
pub mod types;

pub use history::ChatHistory;
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use types::StoredChat;

/// Key holding the user's selected provider name
pub const PROVIDER_KEY: &str = "ai_provider";

/// Key holding the streamable HTTP MCP endpoint
pub const HTTP_URL_KEY: &str = "mcp_http_url";

/// Key holding the SSE MCP endpoint
pub const SSE_URL_KEY: &str = "mcp_sse_url";

/// Store key for a provider's API key: `<provider_lowercased>_api_key`
///
/// # Examples
///
/// ```
/// use parley::storage::api_key_store_key;
///
/// assert_eq!(api_key_store_key("OpenRouter"), "openrouter_api_key");
/// ```
pub fn api_key_store_key(provider: &str) -> String {
    format!("{}_api_key", provider.to_lowercase())
}

/// String key-value store used for on-device settings
///
/// Mirrors the usual mobile async-storage surface: single and bulk reads,
/// writes and removals plus `clear` and `get_all_keys`. Implementations must
/// be safe to share between tasks.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// All keys currently stored, in ascending order
    fn get_all_keys(&self) -> Result<Vec<String>>;

    /// Read several keys at once, preserving request order
    fn multi_get(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>> {
        keys.iter()
            .map(|k| Ok((k.clone(), self.get(k)?)))
            .collect()
    }

    /// Write several pairs
    fn multi_set(&self, pairs: &[(String, String)]) -> Result<()> {
        for (k, v) in pairs {
            self.set(k, v)?;
        }
        Ok(())
    }

    /// Remove several keys
    fn multi_remove(&self, keys: &[String]) -> Result<()> {
        for k in keys {
            self.remove(k)?;
        }
        Ok(())
    }
}

/// Read a key and treat empty or whitespace-only values as absent
pub fn get_non_empty(store: &dyn KeyValueStore, key: &str) -> Result<Option<String>> {
    Ok(store
        .get(key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Default data directory for Parley's on-device files
pub fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("dev", "parley", "parley")
        .ok_or_else(|| ParleyError::Storage("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}
