use thiserror::Error;

/// Errors from identity parsing and verification.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The claim could not be encoded or decoded.
    #[error("identity codec error: {0}")]
    Codec(String),

    /// The signature is structurally malformed (wrong length, bad recovery
    /// byte).
    #[error("malformed identity signature: {reason}")]
    MalformedSignature { reason: String },

    /// Signing failed at the crypto layer.
    #[error("identity signing failed: {reason}")]
    Signing { reason: String },

    /// The subject tree could not be loaded.
    #[error("unknown subject: {did}")]
    UnknownSubject { did: String },

    /// Ownership resolution failed.
    #[error("ownership resolution failed: {0}")]
    Ownership(String),

    #[error(transparent)]
    Type(#[from] arbor_types::TypeError),
}

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
