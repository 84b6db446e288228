//! Disk-backed key-value store on sled

use super::KeyValueStore;
use crate::error::{ParleyError, Result};
use sled::Db;
use std::path::Path;

/// Environment variable overriding the settings store location
pub const STORE_PATH_ENV: &str = "PARLEY_STORE_PATH";

/// [`KeyValueStore`] persisted in an embedded sled database
///
/// Every write is flushed before returning so a crash right after a settings
/// save never loses the new value.
pub struct SledStore {
    db: Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish_non_exhaustive()
    }
}

impl SledStore {
    /// Open (or create) a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Storage` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ParleyError::Storage(format!("Failed to create store directory: {}", e))
            })?;
        }
        let db = sled::open(path)
            .map_err(|e| ParleyError::Storage(format!("Failed to open settings store: {}", e)))?;
        tracing::debug!("Opened settings store at {}", path.display());
        Ok(Self { db })
    }

    /// Open the store at the configured location
    ///
    /// `PARLEY_STORE_PATH` wins over `configured`; with neither set the store
    /// lives under the platform data directory.
    pub fn open_default(configured: Option<&str>) -> Result<Self> {
        if let Ok(override_path) = std::env::var(STORE_PATH_ENV) {
            return Self::open(override_path);
        }
        match configured {
            Some(path) => Self::open(path),
            None => Self::open(super::default_data_dir()?.join("settings.sled")),
        }
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ParleyError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| ParleyError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    ParleyError::Storage(format!("Stored value for {} is not UTF-8: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| ParleyError::Storage(format!("Insert failed: {}", e)))?;
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ParleyError::Storage(format!("Remove failed: {}", e)))?;
        self.flush()
    }

    fn clear(&self) -> Result<()> {
        self.db
            .clear()
            .map_err(|e| ParleyError::Storage(format!("Clear failed: {}", e)))?;
        self.flush()
    }

    fn get_all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for result in self.db.iter().keys() {
            let key =
                result.map_err(|e| ParleyError::Storage(format!("Iteration failed: {}", e)))?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    fn multi_set(&self, pairs: &[(String, String)]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (k, v) in pairs {
            batch.insert(k.as_bytes(), v.as_bytes());
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| ParleyError::Storage(format!("Batch insert failed: {}", e)))?;
        self.flush()
    }

    fn multi_remove(&self, keys: &[String]) -> Result<()> {
        let mut batch = sled::Batch::default();
        for k in keys {
            batch.remove(k.as_bytes());
        }
        self.db
            .apply_batch(batch)
            .map_err(|e| ParleyError::Storage(format!("Batch remove failed: {}", e)))?;
        self.flush()
    }
}
