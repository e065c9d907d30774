use thiserror::Error;

use arbor_dag::DagError;
use arbor_store::StoreError;
use arbor_types::TypeError;

/// Errors from ChainTree operations.
///
/// Block-level *rejections* (bad signature, wrong height, failed policy) are
/// not errors; they travel as [`crate::Validated::Invalid`] so callers can
/// distinguish "this block is wrong" from "something broke".
#[derive(Debug, Error)]
pub enum ChainTreeError {
    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A transaction was missing its payload for the declared type.
    #[error("transaction of type {kind} is missing its payload")]
    MissingPayload { kind: String },

    /// Signing or signature recovery failed at the crypto layer.
    #[error("signature error: {reason}")]
    Signature { reason: String },

    /// The tree root is structurally malformed (missing id/tree/chain).
    #[error("malformed chaintree root: {reason}")]
    MalformedRoot { reason: String },

    /// A pluggable block validator failed to run (as opposed to denying).
    #[error("block validator failed: {reason}")]
    Validator { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for ChainTree operations.
pub type ChainTreeResult<T> = Result<T, ChainTreeError>;
