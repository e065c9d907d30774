//! ABR validation: from wire request to candidate new tip.
//!
//! Validation runs against a scratch store layered over durable state: the
//! ABR's claimed nodes land in the scratch layer, reads fall through to the
//! durable layer, and nothing is persisted unless the aggregator commits.
//!
//! Client faults (bad payload, wrong height, unauthorized signer, failing
//! policy) come back as [`Validated::Invalid`]; infrastructure faults
//! propagate as errors.

use std::sync::Arc;

use cid::Cid;
use tracing::debug;

use arbor_dag::{DagError, DagGetter};
use arbor_store::{BlockStore, KvBlockStore, MemoryKeyValueStore, Node, StoreResult};

use crate::abr::AddBlockRequest;
use crate::block::BlockWithHeaders;
use crate::error::{ChainTreeError, ChainTreeResult};
use crate::ownership::resolve_owners;
use crate::process::process_block;
use crate::signing::recover_signers;
use crate::transactors::TransactorRegistry;
use crate::tree::ChainTree;

/// Decision from a pluggable block validator (e.g. the per-tree write
/// policy).
pub enum ValidatorDecision {
    Allow,
    Deny(String),
}

/// A pluggable check run against the pre-block tree and the incoming block.
///
/// The getter lets checks resolve other objects (grafted policy wants).
pub type BlockValidatorFn = Arc<
    dyn Fn(&ChainTree, &BlockWithHeaders, &dyn DagGetter) -> ChainTreeResult<ValidatorDecision>
        + Send
        + Sync,
>;

/// Outcome of validating an ABR.
pub enum Validated {
    /// The block applies cleanly; here is the candidate tip and its nodes.
    Valid { new_tip: Cid, new_nodes: Vec<Node> },
    /// The block is rejected for a block-level reason.
    Invalid { reason: String },
}

impl Validated {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`Validated::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Scratch layer: ABR-claimed nodes over the durable store.
struct ScratchStore {
    upper: KvBlockStore<MemoryKeyValueStore>,
    lower: Arc<dyn BlockStore>,
}

impl ScratchStore {
    fn new(lower: Arc<dyn BlockStore>) -> Self {
        Self {
            upper: KvBlockStore::new(Arc::new(MemoryKeyValueStore::new())),
            lower,
        }
    }
}

impl BlockStore for ScratchStore {
    fn get(&self, cid: &Cid) -> StoreResult<Option<Node>> {
        if let Some(node) = self.upper.get(cid)? {
            return Ok(Some(node));
        }
        self.lower.get(cid)
    }

    fn put(&self, node: &Node) -> StoreResult<Cid> {
        self.upper.put(node)
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.upper.has(cid)? || self.lower.has(cid)?)
    }
}

/// Validates ABRs into candidate tips.
pub struct BlockValidator {
    registry: TransactorRegistry,
    validators: Vec<BlockValidatorFn>,
}

impl BlockValidator {
    /// A validator with the given transactor registry and no extra checks.
    pub fn new(registry: TransactorRegistry) -> Self {
        Self {
            registry,
            validators: Vec::new(),
        }
    }

    /// Append a pluggable block validator; it runs after the built-in
    /// checks, in registration order.
    pub fn add_validator(&mut self, validator: BlockValidatorFn) {
        self.validators.push(validator);
    }

    /// Validate an ABR, producing a candidate tip.
    ///
    /// The base tree is reconstructed from the ABR's `previous_tip` over the
    /// claimed state nodes (falling back to `store`); whether that previous
    /// tip is still *current* is the aggregator's compare-and-swap, not a
    /// validation concern. `getter` resolves foreign trees for grafted
    /// ownership and policy wants.
    pub fn validate_abr(
        &self,
        abr: &AddBlockRequest,
        store: Arc<dyn BlockStore>,
        getter: &dyn DagGetter,
    ) -> ChainTreeResult<Validated> {
        let did = match abr.did() {
            Ok(did) => did,
            Err(e) => return Ok(Validated::invalid(format!("bad object id: {e}"))),
        };
        let bwh = match abr.block() {
            Ok(bwh) => bwh,
            Err(e) => return Ok(Validated::invalid(format!("payload is not a block: {e}"))),
        };
        if bwh.block.height != abr.height {
            return Ok(Validated::invalid(format!(
                "abr height {} does not match block height {}",
                abr.height, bwh.block.height
            )));
        }

        // Stage the claimed state nodes over the durable store.
        let scratch: Arc<dyn BlockStore> = Arc::new(ScratchStore::new(store));
        let mut state_nodes = Vec::with_capacity(abr.state.len());
        for bytes in &abr.state {
            match Node::from_bytes(bytes.to_vec()) {
                Ok(node) => state_nodes.push(node),
                Err(e) => return Ok(Validated::invalid(format!("bad state node: {e}"))),
            }
        }
        scratch.put_many(&state_nodes)?;

        // Establish the base tree and check tip/height consistency between
        // the block and the ABR envelope.
        let abr_prev = match abr.previous_tip_cid() {
            Ok(prev) => prev,
            Err(e) => return Ok(Validated::invalid(e.to_string())),
        };
        let base = match bwh.block.previous_tip {
            Some(block_prev) => {
                if abr_prev != Some(block_prev) {
                    return Ok(Validated::invalid(
                        "block previous tip does not match the abr previous tip",
                    ));
                }
                let base = match ChainTree::from_tip(block_prev, Arc::clone(&scratch)) {
                    Ok(base) => base,
                    // The claimed state did not include the base tree.
                    Err(e) if is_client_fault(&e) => {
                        return Ok(Validated::invalid(format!("previous tip unusable: {e}")))
                    }
                    Err(e) => return Err(e),
                };
                let expected = base.height()?.map_or(0, |h| h + 1);
                if bwh.block.height != expected {
                    return Ok(Validated::invalid(format!(
                        "expected height {expected}, got {}",
                        bwh.block.height
                    )));
                }
                base
            }
            None => {
                if bwh.block.height != 0 {
                    return Ok(Validated::invalid(format!(
                        "first block must have height 0, got {}",
                        bwh.block.height
                    )));
                }
                let base = ChainTree::new_empty(&did, Arc::clone(&scratch))?;
                // The ABR may carry either nothing or the canonical empty
                // tip as its previous tip.
                if let Some(prev) = abr_prev {
                    if prev != *base.tip() {
                        return Ok(Validated::invalid(
                            "genesis previous tip is not the empty tree",
                        ));
                    }
                }
                base
            }
        };

        // Every signature must recover to an authorized owner.
        let signers = match recover_signers(&bwh) {
            Ok(signers) => signers,
            Err(ChainTreeError::Signature { reason }) => {
                return Ok(Validated::invalid(format!("bad signature: {reason}")))
            }
            Err(other) => return Err(other),
        };
        if signers.is_empty() {
            return Ok(Validated::invalid("block carries no signatures"));
        }
        let owners = resolve_owners(&base, getter)?;
        for signer in &signers {
            if !owners.contains(signer) {
                return Ok(Validated::invalid(format!(
                    "signer {signer} is not an authorized owner"
                )));
            }
        }

        // Pluggable checks (the per-tree write policy plugs in here).
        for validator in &self.validators {
            if let ValidatorDecision::Deny(reason) = validator(&base, &bwh, getter)? {
                return Ok(Validated::invalid(reason));
            }
        }

        // Apply the block.
        match process_block(&base, &bwh, &self.registry) {
            Ok(processed) => {
                debug!(%did, height = bwh.block.height, new_tip = %processed.new_tip, "abr valid");
                Ok(Validated::Valid {
                    new_tip: processed.new_tip,
                    new_nodes: processed.new_nodes,
                })
            }
            Err(e) if is_client_fault(&e) => {
                Ok(Validated::invalid(format!("block does not apply: {e}")))
            }
            Err(e) => Err(e),
        }
    }
}

/// Faults attributable to the request (as opposed to the infrastructure).
fn is_client_fault(err: &ChainTreeError) -> bool {
    match err {
        ChainTreeError::Store(_) => false,
        ChainTreeError::Dag(DagError::Store(_)) => false,
        // A missing node means the claimed state set was incomplete.
        _ => true,
    }
}
