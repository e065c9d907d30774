use cid::Cid;
use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested node was not found.
    #[error("node not found: {0}")]
    NotFound(Cid),

    /// A put claimed a CID that does not match the node bytes.
    #[error("cid mismatch: claimed {claimed}, computed {computed}")]
    CidMismatch { claimed: Cid, computed: Cid },

    /// Node bytes could not be encoded or decoded as DAG-CBOR.
    #[error("codec error: {0}")]
    Codec(String),

    /// A stored value was malformed (e.g. a tip record that is not a CID).
    #[error("corrupt record for {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// I/O error from the underlying backend.
    #[error("storage I/O error: {0}")]
    Io(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
