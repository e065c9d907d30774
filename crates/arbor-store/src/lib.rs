//! Content-addressed storage for the Arbor aggregator.
//!
//! Two storage planes share one batching key/value backend:
//!
//! - The **block store** holds immutable DAG nodes keyed by CID. Nodes are
//!   canonical DAG-CBOR bytes; their CID is computed from those bytes, so a
//!   node can never be stored under the wrong key.
//! - The **tip index** maps each ChainTree DID to the CID of its current
//!   root. Writes here are unconditional; the compare-and-swap discipline
//!   lives one layer up in the aggregator, where it can be paired with block
//!   validation.
//!
//! # Design Rules
//!
//! 1. Nodes are immutable once written (content-addressing guarantees this).
//! 2. `put` is idempotent; a put whose bytes hash differently than the
//!    claimed CID is rejected.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets node contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod blocks;
pub mod error;
pub mod kv;
pub mod node;
pub mod tips;

pub use blocks::{BlockStore, CachedBlockStore, KvBlockStore, DEFAULT_CACHE_SIZE};
pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use node::{cid_for_bytes, Node};
pub use tips::TipIndex;
