//! The ChainTree: a DAG root with the conventional `id`/`tree`/`chain`
//! layout.

use std::collections::BTreeMap;
use std::sync::Arc;

use cid::Cid;
use ipld_core::ipld::Ipld;

use arbor_dag::Dag;
use arbor_store::{BlockStore, Node};
use arbor_types::Did;

use crate::error::{ChainTreeError, ChainTreeResult};

/// Root key for the application data subtree.
pub const TREE_LABEL: &str = "tree";
/// Root key for the history summary.
pub const CHAIN_LABEL: &str = "chain";
/// Root key for the object's DID.
pub const ID_LABEL: &str = "id";
/// Data directory under `tree`.
pub const DATA_LABEL: &str = "data";
/// Chain key linking to the last applied block.
pub const CHAIN_END_LABEL: &str = "end";
/// Chain key holding the current height.
pub const CHAIN_HEIGHT_LABEL: &str = "height";
/// Path segments of the authorized-owner list.
pub const AUTHENTICATIONS_PATH: [&str; 3] = ["tree", "_tupelo", "authentications"];

/// A logical versioned object: its DID plus a DAG view of its current root.
#[derive(Clone, Debug)]
pub struct ChainTree {
    did: Did,
    dag: Dag,
}

impl ChainTree {
    /// The canonical empty-tree nodes for a DID, root last.
    ///
    /// The genesis tip is a pure function of the DID, so clients and the
    /// aggregator compute the same starting point independently.
    pub fn empty_tree_nodes(did: &Did) -> ChainTreeResult<Vec<Node>> {
        let data = Node::from_ipld(&Ipld::Map(BTreeMap::new()))?;

        let mut tree_map = BTreeMap::new();
        tree_map.insert(DATA_LABEL.to_string(), Ipld::Link(*data.cid()));
        let tree = Node::from_ipld(&Ipld::Map(tree_map))?;

        let mut chain_map = BTreeMap::new();
        chain_map.insert(CHAIN_END_LABEL.to_string(), Ipld::Null);
        let chain = Node::from_ipld(&Ipld::Map(chain_map))?;

        let mut root_map = BTreeMap::new();
        root_map.insert(ID_LABEL.to_string(), Ipld::String(did.as_str().to_string()));
        root_map.insert(TREE_LABEL.to_string(), Ipld::Link(*tree.cid()));
        root_map.insert(CHAIN_LABEL.to_string(), Ipld::Link(*chain.cid()));
        let root = Node::from_ipld(&Ipld::Map(root_map))?;

        Ok(vec![data, tree, chain, root])
    }

    /// Build and persist the canonical empty tree for a DID.
    pub fn new_empty(did: &Did, store: Arc<dyn BlockStore>) -> ChainTreeResult<Self> {
        let nodes = Self::empty_tree_nodes(did)?;
        let tip = *nodes.last().expect("empty tree always has a root").cid();
        store.put_many(&nodes)?;

        Ok(Self {
            did: did.clone(),
            dag: Dag::new(tip, store),
        })
    }

    /// View an existing tree at `tip`, reading its DID from the root node.
    pub fn from_tip(tip: Cid, store: Arc<dyn BlockStore>) -> ChainTreeResult<Self> {
        let dag = Dag::new(tip, store);
        let res = dag.resolve(&[ID_LABEL.to_string()])?;
        let did = match res.value {
            Some(Ipld::String(s)) => Did::parse(s)?,
            _ => {
                return Err(ChainTreeError::MalformedRoot {
                    reason: "root has no id".into(),
                })
            }
        };
        Ok(Self { did, dag })
    }

    /// Wrap a DAG whose DID is already known (skips the root read).
    pub fn from_parts(did: Did, dag: Dag) -> Self {
        Self { did, dag }
    }

    /// The object's DID.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// The underlying DAG view.
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// The current tip.
    pub fn tip(&self) -> &Cid {
        self.dag.tip()
    }

    /// The height recorded in the chain summary; `None` before any block
    /// has been applied.
    pub fn height(&self) -> ChainTreeResult<Option<u64>> {
        let path = [CHAIN_LABEL.to_string(), CHAIN_HEIGHT_LABEL.to_string()];
        let res = self.dag.resolve(&path)?;
        match res.value {
            Some(Ipld::Integer(i)) if i >= 0 => Ok(Some(i as u64)),
            _ => Ok(None),
        }
    }
}
