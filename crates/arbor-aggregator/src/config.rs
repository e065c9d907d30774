//! Aggregator configuration.

use std::sync::Arc;

use arbor_chaintree::TransactorRegistry;
use arbor_store::KeyValueStore;
use arbor_types::Did;

use crate::aggregator::AddBlockWrapper;

/// Callback invoked synchronously after each successful Add.
///
/// Implemented as a callback so embedded (e.g. serverless) operation stays
/// synchronous; wire your own channel sender if you prefer async fan-out.
pub type UpdateFn = Box<dyn Fn(&AddBlockWrapper) + Send + Sync>;

/// Configuration for a new [`crate::Aggregator`].
pub struct AggregatorConfig {
    /// Durable key/value backend shared by the block store and tip index.
    pub key_value_store: Arc<dyn KeyValueStore>,
    /// Transaction-type registry (the notary-group configuration).
    pub registry: TransactorRegistry,
    /// DID of the distinguished config tree carrying global policies.
    pub config_did: Option<Did>,
    /// Optional update callback (the notification-bus boundary).
    pub update_fn: Option<UpdateFn>,
}

impl AggregatorConfig {
    /// Config with the standard transactors, no config tree, no callback.
    pub fn new(key_value_store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            key_value_store,
            registry: TransactorRegistry::standard(),
            config_did: None,
            update_fn: None,
        }
    }

    /// Set the config-tree DID.
    pub fn with_config_did(mut self, did: Did) -> Self {
        self.config_did = Some(did);
        self
    }

    /// Set the update callback.
    pub fn with_update_fn(mut self, update_fn: UpdateFn) -> Self {
        self.update_fn = Some(update_fn);
        self
    }
}
