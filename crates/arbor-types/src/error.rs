use thiserror::Error;

/// Errors produced by type parsing and derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A DID string failed validation.
    #[error("invalid DID {did}: {reason}")]
    InvalidDid { did: String, reason: String },

    /// An address string failed validation.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A public key had the wrong shape for address derivation.
    #[error("invalid public key: {reason}")]
    InvalidPublicKey { reason: String },
}
