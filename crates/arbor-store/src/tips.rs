//! The tip index: DID → CID of the current root.
//!
//! A missing tip is a first-class value meaning "this object has no state
//! yet", not an error. `set_tip` is unconditional here; the aggregator
//! serializes writers per object and pairs the write with validation.

use std::sync::Arc;

use cid::Cid;
use tracing::debug;

use arbor_types::Did;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;

fn tip_key(did: &Did) -> String {
    format!("/tips/{did}")
}

/// Persistent mapping from object DID to current tip CID.
pub struct TipIndex<K: ?Sized> {
    kv: Arc<K>,
}

impl<K: KeyValueStore + ?Sized> TipIndex<K> {
    /// Wrap a key/value store.
    pub fn new(kv: Arc<K>) -> Self {
        Self { kv }
    }

    /// Read the current tip. `Ok(None)` means the object has never been
    /// written.
    pub fn get_tip(&self, did: &Did) -> StoreResult<Option<Cid>> {
        let key = tip_key(did);
        match self.kv.get(&key)? {
            Some(bytes) => {
                let cid = Cid::try_from(bytes.as_slice()).map_err(|e| {
                    StoreError::CorruptRecord {
                        key,
                        reason: format!("tip is not a CID: {e}"),
                    }
                })?;
                Ok(Some(cid))
            }
            None => Ok(None),
        }
    }

    /// Write the tip unconditionally.
    pub fn set_tip(&self, did: &Did, tip: &Cid) -> StoreResult<()> {
        debug!(%did, %tip, "set tip");
        self.kv.put(&tip_key(did), &tip.to_bytes())
    }
}
