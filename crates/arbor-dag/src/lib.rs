//! Merkle DAG traversal for the Arbor aggregator.
//!
//! A [`Dag`] is an immutable view of a content-addressed tree rooted at a
//! tip CID. Resolution descends dotted paths through linked nodes while
//! recording every node it dereferences, so callers can prove to a client
//! exactly which blocks back a value.
//!
//! [`GraftedWalker`] extends resolution across object boundaries: a path
//! segment or an intermediate value that is a DID switches the walk to the
//! latest root of that foreign object, bounded by a hop budget.

pub mod dag;
pub mod error;
pub mod graft;
pub mod value;

pub use dag::{Dag, Resolution};
pub use error::{DagError, DagResult};
pub use graft::{DagGetter, GraftedWalker, MAX_GRAFT_HOPS};
pub use value::{ipld_to_json, json_to_ipld};

// Re-exported so downstream crates name one IPLD type.
pub use ipld_core::ipld::Ipld;
