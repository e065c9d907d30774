//! Block application: transactions → new tree state → new tip.

use cid::Cid;
use ipld_core::ipld::Ipld;
use tracing::debug;

use arbor_dag::Dag;
use arbor_store::Node;
use arbor_types::Did;

use crate::block::BlockWithHeaders;
use crate::error::{ChainTreeError, ChainTreeResult};
use crate::transactors::TransactorRegistry;
use crate::tree::{ChainTree, CHAIN_END_LABEL, CHAIN_HEIGHT_LABEL, CHAIN_LABEL};

/// The result of applying a block to a tree.
pub struct ProcessedBlock {
    /// The new root CID.
    pub new_tip: Cid,
    /// Every node created by the application, root included.
    pub new_nodes: Vec<Node>,
}

/// Apply a block's transactions to `tree` and advance the chain summary.
///
/// This is the pure state transformation: signature, height, and ownership
/// checks live in [`crate::validate`]. New nodes are returned, not
/// persisted; the caller stores them when the surrounding operation commits.
pub fn process_block(
    tree: &ChainTree,
    bwh: &BlockWithHeaders,
    registry: &TransactorRegistry,
) -> ChainTreeResult<ProcessedBlock> {
    let mut new_nodes = Vec::new();

    // Play every transaction against a moving DAG view.
    let mut dag = tree.dag().clone();
    for tx in &bwh.block.transactions {
        let (tip, nodes) = registry.apply(&dag, tx)?;
        // Later transactions must see earlier writes before anything is
        // persisted, so stage the nodes into the working store now.
        dag.store().put_many(&nodes)?;
        new_nodes.extend(nodes);
        dag = Dag::new(tip, dag.store().clone());
    }

    // Record the block itself and point the chain summary at it.
    let block_bytes =
        serde_ipld_dagcbor::to_vec(bwh).map_err(|e| ChainTreeError::Codec(e.to_string()))?;
    let block_node = Node::from_bytes(block_bytes)?;

    let mut chain_map = std::collections::BTreeMap::new();
    chain_map.insert(CHAIN_END_LABEL.to_string(), Ipld::Link(*block_node.cid()));
    chain_map.insert(
        CHAIN_HEIGHT_LABEL.to_string(),
        Ipld::Integer(i128::from(bwh.block.height)),
    );
    let chain_node = Node::from_ipld(&Ipld::Map(chain_map))?;

    let mut root_map = match dag.node(dag.tip())?.ipld()? {
        Ipld::Map(map) => map,
        _ => {
            return Err(ChainTreeError::MalformedRoot {
                reason: "root is not a map".into(),
            })
        }
    };
    root_map.insert(CHAIN_LABEL.to_string(), Ipld::Link(*chain_node.cid()));
    let root_node = Node::from_ipld(&Ipld::Map(root_map))?;
    let new_tip = *root_node.cid();

    dag.store()
        .put_many(&[block_node.clone(), chain_node.clone(), root_node.clone()])?;
    new_nodes.push(block_node);
    new_nodes.push(chain_node);
    new_nodes.push(root_node);

    debug!(did = %tree.did(), height = bwh.block.height, %new_tip, "processed block");
    Ok(ProcessedBlock { new_tip, new_nodes })
}

/// Convenience: the tree view after applying a block.
pub fn tree_after(
    tree: &ChainTree,
    processed: &ProcessedBlock,
) -> ChainTreeResult<ChainTree> {
    let did: Did = tree.did().clone();
    Ok(ChainTree::from_parts(
        did,
        Dag::new(processed.new_tip, tree.dag().store().clone()),
    ))
}
