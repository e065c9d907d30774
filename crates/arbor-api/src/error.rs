use thiserror::Error;

/// Errors translating between wire messages and core types.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base64 payload failed to decode.
    #[error("bad base64: {0}")]
    Base64(String),

    /// An embedded structure failed to parse.
    #[error("bad payload: {0}")]
    Payload(String),
}

/// Result alias for wire translations.
pub type ApiResult<T> = Result<T, ApiError>;
