use cid::Cid;
use thiserror::Error;

use arbor_chaintree::ChainTreeError;
use arbor_dag::DagError;
use arbor_policy::PolicyError;
use arbor_store::StoreError;

/// Errors surfaced by aggregator operations.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Unknown object id or missing node.
    #[error("not found")]
    NotFound,

    /// The block failed validation. Non-retryable.
    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    /// The client raced another writer; refetch the tip and rebuild.
    #[error("previous tip did not match existing tip: {current}")]
    PreviousTipMismatch { current: Cid },

    /// A policy bundle failed to compile. For Adds to the config tree the
    /// tip has already advanced when this is returned.
    #[error("policy failed to compile: {reason}")]
    PolicyCompile { reason: String },

    /// Policy evaluation infrastructure failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Underlying storage failed; possibly transient.
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    ChainTree(#[from] ChainTreeError),

    #[error(transparent)]
    Dag(#[from] DagError),

    /// The caller cancelled before any state change.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias for aggregator operations.
pub type AggregatorResult<T> = Result<T, AggregatorError>;
