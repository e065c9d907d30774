//! The content-addressed block store.
//!
//! [`BlockStore`] is the only interface the rest of the system uses to
//! persist or fetch nodes. [`KvBlockStore`] adapts any [`KeyValueStore`];
//! [`CachedBlockStore`] fronts another block store with an LRU cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use cid::Cid;
use lru::LruCache;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;
use crate::node::Node;

/// Default number of nodes held by the LRU front.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Content-addressed node storage.
///
/// `put` is idempotent: storing the same node twice is a no-op. The CID is
/// always computed from the node bytes, never trusted from the caller.
pub trait BlockStore: Send + Sync {
    /// Fetch a node. Returns `Ok(None)` when absent.
    fn get(&self, cid: &Cid) -> StoreResult<Option<Node>>;

    /// Store a node, returning its CID.
    fn put(&self, node: &Node) -> StoreResult<Cid>;

    /// Check presence without fetching.
    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.get(cid)?.is_some())
    }

    /// Store many nodes. Default implementation calls `put()` per node;
    /// backends may override to batch.
    fn put_many(&self, nodes: &[Node]) -> StoreResult<()> {
        for node in nodes {
            self.put(node)?;
        }
        Ok(())
    }
}

fn block_key(cid: &Cid) -> String {
    format!("/blocks/{cid}")
}

/// Block store over a batching key/value backend.
pub struct KvBlockStore<K: ?Sized> {
    kv: Arc<K>,
}

impl<K: KeyValueStore + ?Sized> KvBlockStore<K> {
    /// Wrap a key/value store.
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }
}

impl<K: KeyValueStore + ?Sized> BlockStore for KvBlockStore<K> {
    fn get(&self, cid: &Cid) -> StoreResult<Option<Node>> {
        match self.kv.get(&block_key(cid))? {
            Some(bytes) => {
                let node = Node::from_bytes_claimed(bytes, cid).map_err(|e| match e {
                    StoreError::CidMismatch { claimed, computed } => StoreError::CorruptRecord {
                        key: block_key(&claimed),
                        reason: format!("stored bytes hash to {computed}"),
                    },
                    other => other,
                })?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn put(&self, node: &Node) -> StoreResult<Cid> {
        let key = block_key(node.cid());
        // Idempotent: content-addressing guarantees equal bytes under an
        // existing key.
        if !self.kv.has(&key)? {
            self.kv.put(&key, node.bytes())?;
        }
        Ok(*node.cid())
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        self.kv.has(&block_key(cid))
    }

    fn put_many(&self, nodes: &[Node]) -> StoreResult<()> {
        let entries: Vec<(String, Vec<u8>)> = nodes
            .iter()
            .map(|n| (block_key(n.cid()), n.bytes().to_vec()))
            .collect();
        self.kv.put_batch(&entries)
    }
}

/// An LRU cache in front of another block store.
///
/// The cache is internally synchronized; nodes are immutable so a cached
/// node can never go stale.
pub struct CachedBlockStore<S> {
    inner: S,
    cache: Mutex<LruCache<Cid, Node>>,
}

impl<S: BlockStore> CachedBlockStore<S> {
    /// Wrap a block store with a cache of [`DEFAULT_CACHE_SIZE`] nodes.
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    /// Wrap with an explicit cache capacity (minimum 1).
    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<S: BlockStore> BlockStore for CachedBlockStore<S> {
    fn get(&self, cid: &Cid) -> StoreResult<Option<Node>> {
        {
            let mut cache = self.cache.lock().expect("lock poisoned");
            if let Some(node) = cache.get(cid) {
                trace!(%cid, "block cache hit");
                return Ok(Some(node.clone()));
            }
        }
        let fetched = self.inner.get(cid)?;
        if let Some(node) = &fetched {
            let mut cache = self.cache.lock().expect("lock poisoned");
            cache.put(*cid, node.clone());
        }
        Ok(fetched)
    }

    fn put(&self, node: &Node) -> StoreResult<Cid> {
        let cid = self.inner.put(node)?;
        let mut cache = self.cache.lock().expect("lock poisoned");
        cache.put(cid, node.clone());
        Ok(cid)
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        {
            let mut cache = self.cache.lock().expect("lock poisoned");
            if cache.get(cid).is_some() {
                return Ok(true);
            }
        }
        self.inner.has(cid)
    }

    fn put_many(&self, nodes: &[Node]) -> StoreResult<()> {
        self.inner.put_many(nodes)?;
        let mut cache = self.cache.lock().expect("lock poisoned");
        for node in nodes {
            cache.put(*node.cid(), node.clone());
        }
        Ok(())
    }
}
