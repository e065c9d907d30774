//! Cross-object ("grafted") path resolution.
//!
//! ChainTrees reference each other by DID: a path segment may name a foreign
//! object outright, and a resolved value may be a DID string (or a list of
//! them) standing in for the foreign object's root. The walker follows both
//! forms through a [`DagGetter`], carrying a hop budget and a visited set so
//! cyclic grafts fail instead of spinning.

use std::collections::HashSet;

use cid::Cid;
use ipld_core::ipld::Ipld;
use tracing::trace;

use arbor_types::Did;

use crate::dag::{Dag, Resolution};
use crate::error::{DagError, DagResult};

/// Maximum number of cross-object hops in a single walk.
pub const MAX_GRAFT_HOPS: usize = 32;

/// Access to the latest state of other objects.
///
/// The aggregator implements this; tests may implement it over a map.
pub trait DagGetter: Send + Sync {
    /// The current tip for `did`, or `None` if the object has no state.
    fn get_tip(&self, did: &Did) -> DagResult<Option<Cid>>;

    /// A DAG view of the latest state for `did`.
    fn get_latest(&self, did: &Did) -> DagResult<Option<Dag>>;
}

/// Path resolver that follows DID links between objects.
pub struct GraftedWalker<'a> {
    getter: &'a dyn DagGetter,
}

impl<'a> GraftedWalker<'a> {
    /// Create a walker over the given getter.
    pub fn new(getter: &'a dyn DagGetter) -> Self {
        Self { getter }
    }

    /// Resolve `path` starting in `dag`, grafting through DIDs as needed.
    pub fn resolve(&self, dag: &Dag, path: &[String]) -> DagResult<Resolution> {
        let mut touched = Vec::new();
        let mut visited = HashSet::new();
        let mut hops = 0usize;
        let res = self.resolve_inner(dag, path, &mut touched, &mut visited, &mut hops)?;
        Ok(Resolution {
            value: res.value,
            remaining_path: res.remaining_path,
            touched: dedup_preserving_order(touched),
        })
    }

    /// Resolve a `/`-separated path string. A leading DID segment starts the
    /// walk in that object rather than in `dag`.
    pub fn resolve_str(&self, dag: &Dag, path: &str) -> DagResult<Resolution> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.resolve(dag, &segments)
    }

    fn resolve_inner(
        &self,
        dag: &Dag,
        path: &[String],
        touched: &mut Vec<Cid>,
        visited: &mut HashSet<(String, String)>,
        hops: &mut usize,
    ) -> DagResult<Resolution> {
        // A DID in segment position names a foreign root.
        if let Some(first) = path.first() {
            if Did::is_did_str(first) {
                let did = Did::parse(first.clone())?;
                return self.graft(&did, &path[1..], touched, visited, hops);
            }
        }

        let res = dag.resolve(path)?;
        touched.extend(res.touched.iter().copied());

        if res.remaining_path.is_empty() {
            return Ok(res);
        }

        // Resolution stopped early. If it stopped on a DID-valued leaf, the
        // DID stands for the foreign root and the walk continues there.
        let consumed = path.len() - res.remaining_path.len();
        if consumed == 0 {
            return Ok(res);
        }
        let stuck = dag.resolve(&path[..consumed])?;
        match stuck.value {
            Some(Ipld::String(s)) if Did::is_did_str(&s) => {
                let did = Did::parse(s)?;
                self.graft(&did, &res.remaining_path.clone(), touched, visited, hops)
            }
            Some(Ipld::List(items)) => {
                // A list of DIDs grafts to the first entry that resolves.
                for item in &items {
                    let Ipld::String(s) = item else { continue };
                    if !Did::is_did_str(s) {
                        continue;
                    }
                    let did = Did::parse(s.clone())?;
                    let attempt =
                        self.graft(&did, &res.remaining_path.clone(), touched, visited, hops)?;
                    if attempt.is_resolved() {
                        return Ok(attempt);
                    }
                }
                Ok(res)
            }
            _ => Ok(res),
        }
    }

    fn graft(
        &self,
        did: &Did,
        rest: &[String],
        touched: &mut Vec<Cid>,
        visited: &mut HashSet<(String, String)>,
        hops: &mut usize,
    ) -> DagResult<Resolution> {
        *hops += 1;
        let marker = (did.as_str().to_string(), rest.join("/"));
        if *hops > MAX_GRAFT_HOPS || !visited.insert(marker) {
            return Err(DagError::GraftCycleOrTooDeep { hops: *hops });
        }

        trace!(%did, remaining = rest.len(), hops = *hops, "grafting into foreign object");
        match self.getter.get_latest(did)? {
            Some(foreign) => self.resolve_inner(&foreign, rest, touched, visited, hops),
            None => Ok(Resolution {
                value: None,
                remaining_path: rest.to_vec(),
                touched: Vec::new(),
            }),
        }
    }
}

fn dedup_preserving_order(cids: Vec<Cid>) -> Vec<Cid> {
    let mut seen = HashSet::new();
    cids.into_iter().filter(|c| seen.insert(*c)).collect()
}
