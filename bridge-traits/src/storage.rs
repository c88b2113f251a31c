//! Key-Value Storage Abstraction
//!
//! Platform-agnostic contract for the small, tab-scoped string store the
//! auth flow uses to carry a return path across the OAuth redirect.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;

/// Key-value string storage trait
///
/// Abstracts the host's ephemeral per-tab storage:
/// - Web: sessionStorage
/// - Desktop webview: the embedder's session-scoped store
/// - Tests: [`MemoryKeyValueStore`]
///
/// Implementations map quota errors, disabled storage, and private-browsing
/// restrictions to `BridgeError::OperationFailed`; the core treats every
/// failure as best-effort and degrades without surfacing it.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember(store: &dyn KeyValueStore) -> Result<()> {
///     store.set("auth:return_path", "/insights").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a value.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, overwriting any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Succeeds when the key does not exist.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, scoped to its own instance the way sessionStorage is
/// scoped to a tab. Reference implementation for hosts and the default in
/// tests.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("kv store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("kv store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("kv store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}
