//! The aggregator: Add and Resolve orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use cid::Cid;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use arbor_chaintree::{AddBlockRequest, BlockValidator, ChainTree, Validated};
use arbor_dag::{Dag, DagGetter, DagResult, GraftedWalker};
use arbor_identity::Identity;
use arbor_policy::{
    evaluate_with_wants, policy_from_tree, PolicyError, TreePolicy, READ_MAIN_MODULE,
    READ_WANTS_MODULE, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE,
};
use arbor_store::{BlockStore, CachedBlockStore, KeyValueStore, KvBlockStore, Node, TipIndex};
use arbor_types::{CancelToken, Did};

use crate::config::{AggregatorConfig, UpdateFn};
use crate::error::{AggregatorError, AggregatorResult};
use crate::write_policy::tree_write_policy_validator;

/// A successful Add plus everything the notification boundary needs.
#[derive(Debug)]
pub struct AddBlockWrapper {
    /// The request, with `new_tip` filled in.
    pub abr: AddBlockRequest,
    /// Nodes produced by applying the block.
    pub new_nodes: Vec<Node>,
}

/// Response to an Add.
#[derive(Debug)]
pub struct AddResponse {
    /// `false` means the global write policy denied the request; the client
    /// observes the denial, it is not an error.
    pub is_valid: bool,
    /// The committed tip, present when `is_valid`.
    pub new_tip: Option<Cid>,
    /// Nodes produced by applying the block.
    pub new_nodes: Vec<Node>,
    /// The wrapper handed to the update callback.
    pub wrapper: AddBlockWrapper,
}

/// Response to a tracked resolve.
pub struct ResolveResponse {
    /// The resolved value, `None` when absent (or denied; the shapes are
    /// identical on purpose).
    pub value: Option<arbor_dag::Ipld>,
    /// Unconsumed path suffix; equals the input path when nothing resolved.
    pub remaining_path: Vec<String>,
    /// Every node dereferenced during the walk.
    pub touched_blocks: Vec<Node>,
}

/// A compiled global policy pinned to the config-tree tip it came from.
struct GlobalPolicy {
    policy: TreePolicy,
    config_tip: Cid,
}

/// The aggregator core.
pub struct Aggregator {
    blocks: Arc<dyn BlockStore>,
    tips: TipIndex<dyn KeyValueStore>,
    validator: BlockValidator,
    config_did: Option<Did>,
    global_write: RwLock<Option<GlobalPolicy>>,
    global_read: RwLock<Option<GlobalPolicy>>,
    update_fn: Option<UpdateFn>,
    // Per-object write serialization. Entries are never removed; the table
    // grows with the set of distinct objects written.
    object_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Aggregator {
    /// Build an aggregator from its configuration.
    ///
    /// A configured but not-yet-written config tree is fine: global
    /// policies stay absent until the first write to it.
    pub fn new(config: AggregatorConfig) -> AggregatorResult<Self> {
        let kv = config.key_value_store;
        let blocks: Arc<dyn BlockStore> =
            Arc::new(CachedBlockStore::new(KvBlockStore::new(Arc::clone(&kv))));
        let tips = TipIndex::new(kv);

        let mut validator = BlockValidator::new(config.registry);
        validator.add_validator(tree_write_policy_validator());

        let aggregator = Self {
            blocks,
            tips,
            validator,
            config_did: config.config_did,
            global_write: RwLock::new(None),
            global_read: RwLock::new(None),
            update_fn: config.update_fn,
            object_locks: Mutex::new(HashMap::new()),
        };
        aggregator.reload_global_policies()?;
        Ok(aggregator)
    }

    /// The current tip for an object, `None` if it has no state yet.
    pub fn get_tip(&self, did: &Did) -> AggregatorResult<Option<Cid>> {
        Ok(self.tips.get_tip(did)?)
    }

    /// The latest tree for an object.
    pub fn get_latest(&self, did: &Did) -> AggregatorResult<Option<ChainTree>> {
        match self.tips.get_tip(did)? {
            Some(tip) => Ok(Some(ChainTree::from_tip(tip, Arc::clone(&self.blocks))?)),
            None => Ok(None),
        }
    }

    /// Process an add-block request.
    ///
    /// Pipeline: global write policy → block validation → per-object
    /// compare-and-swap (persist nodes first, flip the tip last) → config
    /// reload when the config tree advanced → synchronous notification.
    pub fn add(&self, token: &CancelToken, abr: &AddBlockRequest) -> AggregatorResult<AddResponse> {
        if token.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }
        let did = abr
            .did()
            .map_err(|e| AggregatorError::InvalidBlock {
                reason: e.to_string(),
            })?;
        debug!(%did, height = abr.height, "add");

        if !self.evaluate_global_write_policy(abr)? {
            debug!(%did, "global write policy denied");
            return Ok(AddResponse {
                is_valid: false,
                new_tip: None,
                new_nodes: Vec::new(),
                wrapper: AddBlockWrapper {
                    abr: abr.clone(),
                    new_nodes: Vec::new(),
                },
            });
        }

        let lock = self.object_lock(&did);
        let _guard = lock.lock().expect("lock poisoned");

        let (new_tip, new_nodes) =
            match self
                .validator
                .validate_abr(abr, Arc::clone(&self.blocks), self)?
            {
                Validated::Valid { new_tip, new_nodes } => (new_tip, new_nodes),
                Validated::Invalid { reason } => {
                    debug!(%did, %reason, "invalid block");
                    return Err(AggregatorError::InvalidBlock { reason });
                }
            };

        // Compare-and-swap: the request must build on the tip we currently
        // hold for this object.
        if let Some(current) = self.tips.get_tip(&did)? {
            let abr_prev = abr.previous_tip_cid().map_err(|e| {
                AggregatorError::InvalidBlock {
                    reason: e.to_string(),
                }
            })?;
            if abr_prev != Some(current) {
                debug!(%did, %current, "previous tip mismatch");
                return Err(AggregatorError::PreviousTipMismatch { current });
            }
        }

        // Last cancellation point: once persistence starts, the operation
        // runs to completion so the tip never dangles.
        if token.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }

        info!(%did, height = abr.height, %new_tip, "storing new tip");
        let mut to_store = Vec::with_capacity(abr.state.len() + new_nodes.len());
        for bytes in &abr.state {
            let node = Node::from_bytes(bytes.to_vec()).map_err(|e| {
                AggregatorError::InvalidBlock {
                    reason: format!("bad state node: {e}"),
                }
            })?;
            to_store.push(node);
        }
        to_store.extend(new_nodes.iter().cloned());
        self.blocks.put_many(&to_store)?;
        self.tips.set_tip(&did, &new_tip)?;

        let mut stored_abr = abr.clone();
        stored_abr.new_tip = new_tip.to_bytes();
        let wrapper = AddBlockWrapper {
            abr: stored_abr,
            new_nodes: new_nodes.clone(),
        };

        if self.config_did.as_ref() == Some(&did) {
            // The tip is already advanced; a reload failure still fails the
            // Add so the operator sees the break.
            self.reload_global_policies()?;
        }

        if let Some(update_fn) = &self.update_fn {
            update_fn(&wrapper);
        }

        Ok(AddResponse {
            is_valid: true,
            new_tip: Some(new_tip),
            new_nodes,
            wrapper,
        })
    }

    /// Resolve a path with read controls.
    ///
    /// Denials are indistinguishable from absence: a client without read
    /// authority must not learn that the object exists.
    pub fn resolve_with_read_controls(
        &self,
        token: &CancelToken,
        identity: Option<&Identity>,
        did: &Did,
        path: &[String],
    ) -> AggregatorResult<ResolveResponse> {
        if token.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }

        let Some(latest) = self.get_latest(did)? else {
            debug!(%did, "resolve: not found");
            return Ok(absent(path));
        };

        let input = read_input(identity, did, path);
        if !self.evaluate_global_read_policy(&input)? {
            debug!(%did, "global read policy denied");
            return Ok(absent(path));
        }

        if let Some(policy) = policy_from_tree(latest.dag(), READ_MAIN_MODULE, READ_WANTS_MODULE)? {
            let allowed = evaluate_with_wants(&policy, latest.dag(), self, &input)?;
            debug!(%did, allowed, "tree read policy");
            if !allowed {
                return Ok(absent(path));
            }
        }

        let walker = GraftedWalker::new(self);
        let resolution = walker.resolve(latest.dag(), path)?;

        let mut touched_blocks = Vec::with_capacity(resolution.touched.len());
        for cid in &resolution.touched {
            match self.blocks.get(cid)? {
                Some(node) => touched_blocks.push(node),
                // A node we just walked has to exist; treat disappearance
                // as a dangling link.
                None => return Err(arbor_dag::DagError::MissingNode(*cid).into()),
            }
        }

        Ok(ResolveResponse {
            value: resolution.value,
            remaining_path: resolution.remaining_path,
            touched_blocks,
        })
    }

    /// Re-extract and install the global policies from the config tree.
    fn reload_global_policies(&self) -> AggregatorResult<()> {
        let Some(config_did) = &self.config_did else {
            return Ok(());
        };
        let Some(tip) = self.tips.get_tip(config_did)? else {
            // Config tree not written yet; both policies stay absent.
            return Ok(());
        };
        let dag = Dag::new(tip, Arc::clone(&self.blocks));

        let write = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .map_err(compile_to_aggregator_error)?;
        let read = policy_from_tree(&dag, READ_MAIN_MODULE, READ_WANTS_MODULE)
            .map_err(compile_to_aggregator_error)?;

        info!(%config_did, %tip, has_write = write.is_some(), has_read = read.is_some(),
            "installing global policies");
        *self.global_write.write().expect("lock poisoned") = write.map(|policy| GlobalPolicy {
            policy,
            config_tip: tip,
        });
        *self.global_read.write().expect("lock poisoned") = read.map(|policy| GlobalPolicy {
            policy,
            config_tip: tip,
        });
        Ok(())
    }

    fn evaluate_global_write_policy(&self, abr: &AddBlockRequest) -> AggregatorResult<bool> {
        let guard = self.global_write.read().expect("lock poisoned");
        let Some(global) = guard.as_ref() else {
            return Ok(true);
        };
        let block = abr.block().map_err(|e| AggregatorError::InvalidBlock {
            reason: format!("payload is not a block: {e}"),
        })?;
        let input = block.to_policy_input()?;
        let config_dag = Dag::new(global.config_tip, Arc::clone(&self.blocks));
        Ok(evaluate_with_wants(
            &global.policy,
            &config_dag,
            self,
            &input,
        )?)
    }

    fn evaluate_global_read_policy(&self, input: &Value) -> AggregatorResult<bool> {
        let guard = self.global_read.read().expect("lock poisoned");
        let Some(global) = guard.as_ref() else {
            return Ok(true);
        };
        let config_dag = Dag::new(global.config_tip, Arc::clone(&self.blocks));
        Ok(evaluate_with_wants(
            &global.policy,
            &config_dag,
            self,
            input,
        )?)
    }

    fn object_lock(&self, did: &Did) -> Arc<Mutex<()>> {
        let mut locks = self.object_locks.lock().expect("lock poisoned");
        Arc::clone(
            locks
                .entry(did.as_str().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

impl DagGetter for Aggregator {
    fn get_tip(&self, did: &Did) -> DagResult<Option<Cid>> {
        Ok(self.tips.get_tip(did)?)
    }

    fn get_latest(&self, did: &Did) -> DagResult<Option<Dag>> {
        Ok(self
            .tips
            .get_tip(did)?
            .map(|tip| Dag::new(tip, Arc::clone(&self.blocks))))
    }
}

fn absent(path: &[String]) -> ResolveResponse {
    ResolveResponse {
        value: None,
        remaining_path: path.to_vec(),
        touched_blocks: Vec::new(),
    }
}

fn read_input(identity: Option<&Identity>, did: &Did, path: &[String]) -> Value {
    json!({
        "method": "GET",
        "object": did.as_str(),
        "path": path.join("/"),
        "identity": identity.map(Identity::to_policy_value).unwrap_or(Value::Null),
    })
}

fn compile_to_aggregator_error(err: PolicyError) -> AggregatorError {
    match err {
        PolicyError::Compile { .. } | PolicyError::BadQuery { .. }
        | PolicyError::MalformedBundle { .. } => AggregatorError::PolicyCompile {
            reason: err.to_string(),
        },
        other => {
            warn!(error = %other, "global policy extraction failed");
            AggregatorError::Policy(other)
        }
    }
}
