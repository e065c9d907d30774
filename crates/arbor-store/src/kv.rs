//! The batching key/value trait and its in-memory implementation.
//!
//! Durable backends (disk, cloud KV) implement [`KeyValueStore`]; the core
//! only assumes single-key atomicity, never multi-key transactions.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;

/// A batching key/value store.
///
/// Implementations must be thread-safe (`Send + Sync`). Keys are namespaced
/// strings (e.g. `/blocks/<cid>`, `/tips/<did>`); values are raw bytes.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write (create or overwrite) a value.
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Check whether a key exists.
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Write multiple entries in a batch.
    ///
    /// Default implementation calls `put()` per entry. Backends may override
    /// for fewer round-trips; callers must not assume atomicity across keys.
    fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> StoreResult<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }
}

/// In-memory, HashMap-based key/value store.
///
/// Intended for tests and embedding. All entries live behind a `RwLock`.
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().expect("lock poisoned");
        Ok(entries.remove(key).is_some())
    }
}

impl std::fmt::Debug for MemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyValueStore")
            .field("key_count", &self.len())
            .finish()
    }
}
