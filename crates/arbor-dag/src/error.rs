use cid::Cid;
use thiserror::Error;

use arbor_store::StoreError;
use arbor_types::TypeError;

/// Errors from DAG traversal and mutation.
#[derive(Debug, Error)]
pub enum DagError {
    /// A linked node is missing from the block store.
    #[error("missing node: {0}")]
    MissingNode(Cid),

    /// A cross-object walk exceeded the hop budget or revisited an object
    /// with the same remaining path (a graft cycle).
    #[error("graft walk exceeded {hops} hops or cycled")]
    GraftCycleOrTooDeep { hops: usize },

    /// A path write descended into a non-map value.
    #[error("cannot write through non-map value at segment {segment:?}")]
    NotAMap { segment: String },

    /// Error from the underlying block store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A grafted segment carried a malformed DID.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for DAG operations.
pub type DagResult<T> = Result<T, DagError>;
