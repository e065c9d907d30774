//! Single-object DAG view: tracked resolution and path writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use cid::Cid;
use ipld_core::ipld::Ipld;
use tracing::trace;

use arbor_store::{BlockStore, Node};

use crate::error::{DagError, DagResult};

/// The outcome of resolving a path.
///
/// A non-empty `remaining_path` means resolution stopped early because an
/// intermediate node lacked the next segment; this is absence, not an error.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// The resolved value, `None` when the path did not fully resolve.
    pub value: Option<Ipld>,
    /// The unconsumed suffix of the input path.
    pub remaining_path: Vec<String>,
    /// Every node dereferenced during the walk, in first-touch order.
    pub touched: Vec<Cid>,
}

impl Resolution {
    /// Returns `true` if the path fully resolved to a value.
    pub fn is_resolved(&self) -> bool {
        self.remaining_path.is_empty()
    }
}

/// An immutable DAG rooted at a tip CID.
///
/// `Dag` holds only the tip and a store handle; nodes are fetched on demand.
/// Mutation never happens in place: [`Dag::set_at`] produces a new root and
/// the set of freshly created nodes.
#[derive(Clone)]
pub struct Dag {
    tip: Cid,
    store: Arc<dyn BlockStore>,
}

impl Dag {
    /// View the DAG rooted at `tip`.
    pub fn new(tip: Cid, store: Arc<dyn BlockStore>) -> Self {
        Self { tip, store }
    }

    /// The root CID.
    pub fn tip(&self) -> &Cid {
        &self.tip
    }

    /// The backing block store.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Fetch a node, treating absence as an error (a dangling link).
    pub fn node(&self, cid: &Cid) -> DagResult<Node> {
        self.store
            .get(cid)?
            .ok_or(DagError::MissingNode(*cid))
    }

    /// Resolve a `/`-separated path string.
    pub fn resolve_str(&self, path: &str) -> DagResult<Resolution> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.resolve(&segments)
    }

    /// Resolve a path against this DAG.
    ///
    /// Links are dereferenced transparently, including a link in the final
    /// position, so callers always see values rather than CIDs. Every
    /// dereferenced node lands in `touched`.
    pub fn resolve(&self, path: &[String]) -> DagResult<Resolution> {
        let mut touched = vec![self.tip];
        let mut current = self.node(&self.tip)?.ipld()?;

        for (index, segment) in path.iter().enumerate() {
            let next = match &current {
                Ipld::Map(map) => map.get(segment).cloned(),
                Ipld::List(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned()),
                _ => None,
            };

            let Some(mut value) = next else {
                trace!(%segment, index, "resolve stopped early");
                return Ok(Resolution {
                    value: None,
                    remaining_path: path[index..].to_vec(),
                    touched,
                });
            };

            // Follow links transparently so the caller sees values.
            while let Ipld::Link(cid) = value {
                touched.push(cid);
                value = self.node(&cid)?.ipld()?;
            }
            current = value;
        }

        Ok(Resolution {
            value: Some(current),
            remaining_path: Vec::new(),
            touched,
        })
    }

    /// Write `value` at `path`, creating intermediate map nodes as needed.
    ///
    /// Every map along the path is its own linked node. Returns the new root
    /// CID and all newly created nodes (root first). The new nodes are *not*
    /// persisted; the caller stores them when the surrounding operation
    /// commits.
    pub fn set_at(&self, path: &[String], value: Ipld) -> DagResult<(Cid, Vec<Node>)> {
        let root = self.node(&self.tip)?.ipld()?;
        let mut new_nodes = Vec::new();
        let new_root = self.set_in(root, path, value, &mut new_nodes)?;
        let root_node = Node::from_ipld(&new_root)?;
        let root_cid = *root_node.cid();
        new_nodes.insert(0, root_node);
        Ok((root_cid, new_nodes))
    }

    fn set_in(
        &self,
        current: Ipld,
        path: &[String],
        value: Ipld,
        new_nodes: &mut Vec<Node>,
    ) -> DagResult<Ipld> {
        let Some((segment, rest)) = path.split_first() else {
            return Ok(value);
        };

        let mut map = match current {
            Ipld::Map(map) => map,
            Ipld::Null => BTreeMap::new(),
            _ => {
                return Err(DagError::NotAMap {
                    segment: segment.clone(),
                })
            }
        };

        if rest.is_empty() {
            map.insert(segment.clone(), value);
            return Ok(Ipld::Map(map));
        }

        // Load the existing child node (or start an empty map), rewrite it,
        // and relink.
        let child = match map.get(segment) {
            Some(Ipld::Link(cid)) => self.node(cid)?.ipld()?,
            Some(other) => other.clone(),
            None => Ipld::Map(BTreeMap::new()),
        };
        let new_child = self.set_in(child, rest, value, new_nodes)?;
        let child_node = Node::from_ipld(&new_child)?;
        map.insert(segment.clone(), Ipld::Link(*child_node.cid()));
        new_nodes.push(child_node);
        Ok(Ipld::Map(map))
    }
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("tip", &self.tip.to_string())
            .finish()
    }
}
