//! Injected persistence capability.
//!
//! The core never touches disk itself: callers hand in a [`Store`] that loads
//! and saves JSON documents by key. [`MemoryStore`] is provided for tests and
//! ephemeral sessions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;

/// Key of the address book document.
pub const ADDRESS_BOOK_KEY: &str = "AddressBook";

/// Key of the chain data document for a chain (eg `EthereumData`).
pub fn chain_data_key(chain: &str) -> String {
    format!("{chain}Data")
}

/// Load/save capability for JSON documents.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a document, `None` if it was never saved.
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Save (overwrite) a document.
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Remove a document.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// ─── In-memory store ─────────────────────────────────────────────────────────

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved documents.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Other("memory store lock poisoned".to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.lock().map_err(poisoned)?.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.data
            .lock()
            .map_err(poisoned)?
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let key = chain_data_key("Ethereum");
        assert_eq!(key, "EthereumData");
        assert!(store.load(&key).await.unwrap().is_none());

        store.save(&key, &serde_json::json!({ "calls": [] })).await.unwrap();
        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded["calls"], serde_json::json!([]));
        assert_eq!(store.len(), 1);

        store.delete(&key).await.unwrap();
        assert!(store.is_empty());
    }
}
