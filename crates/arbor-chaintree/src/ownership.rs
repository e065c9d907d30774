//! Grafted ownership resolution.
//!
//! A tree's owner set is the list at `tree/_tupelo/authentications`. Entries
//! are either plain addresses or DIDs of other trees; a DID delegates to the
//! owner set of that tree, transitively. Before any `setOwnership` has run
//! the list is absent and the owner is the address embedded in the tree's
//! own DID, which is what authorizes genesis blocks.

use std::collections::HashSet;

use ipld_core::ipld::Ipld;
use tracing::trace;

use arbor_dag::{Dag, DagError, DagGetter, MAX_GRAFT_HOPS};
use arbor_types::{Address, Did};

use crate::error::ChainTreeResult;
use crate::tree::{ChainTree, AUTHENTICATIONS_PATH};

/// Resolve the full (grafted) owner set for a tree.
pub fn resolve_owners(
    tree: &ChainTree,
    getter: &dyn DagGetter,
) -> ChainTreeResult<Vec<Address>> {
    let mut owners = Vec::new();
    let mut visited = HashSet::new();
    let mut hops = 0usize;
    collect_owners(
        tree.dag(),
        tree.did(),
        getter,
        &mut owners,
        &mut visited,
        &mut hops,
    )?;
    Ok(owners)
}

fn collect_owners(
    dag: &Dag,
    did: &Did,
    getter: &dyn DagGetter,
    owners: &mut Vec<Address>,
    visited: &mut HashSet<String>,
    hops: &mut usize,
) -> ChainTreeResult<()> {
    if !visited.insert(did.as_str().to_string()) {
        // Already walked this tree; a repeat adds nothing and a cycle would
        // spin forever.
        return Ok(());
    }
    *hops += 1;
    if *hops > MAX_GRAFT_HOPS {
        return Err(DagError::GraftCycleOrTooDeep { hops: *hops }.into());
    }

    let path: Vec<String> = AUTHENTICATIONS_PATH.iter().map(|s| s.to_string()).collect();
    let res = dag.resolve(&path)?;

    let entries = match res.value {
        Some(Ipld::List(items)) if !items.is_empty() => items,
        // No ownership transaction yet: the genesis owner is the address
        // baked into the DID.
        _ => {
            owners.push(did.address()?);
            return Ok(());
        }
    };

    for entry in entries {
        let Ipld::String(text) = entry else { continue };
        if Did::is_did_str(&text) {
            let foreign_did = Did::parse(text)?;
            trace!(%foreign_did, "following ownership graft");
            match getter.get_latest(&foreign_did)? {
                Some(foreign_dag) => {
                    collect_owners(&foreign_dag, &foreign_did, getter, owners, visited, hops)?;
                }
                // An unknown delegate still authorizes its genesis address.
                None => owners.push(foreign_did.address()?),
            }
        } else {
            owners.push(Address::parse(&text)?);
        }
    }

    Ok(())
}
