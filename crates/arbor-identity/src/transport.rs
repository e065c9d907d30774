//! Header transport for signed identities.
//!
//! An `X-Tupelo-Id` header (or equivalent context value) carries
//! base64(DAG-CBOR) of the signed claim.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::claim::SignedIdentity;
use crate::error::{IdentityError, IdentityResult};

/// The header name carrying a signed identity.
pub const IDENTITY_HEADER: &str = "X-Tupelo-Id";

impl SignedIdentity {
    /// Encode for header transport.
    pub fn to_header_value(&self) -> IdentityResult<String> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    /// Decode from a header value.
    pub fn from_header_value(value: &str) -> IdentityResult<Self> {
        let bytes = BASE64
            .decode(value)
            .map_err(|e| IdentityError::Codec(format!("bad base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Pull a signed identity out of a header map.
///
/// Returns `Ok(None)` when the header is absent or empty — an
/// unauthenticated request, not an error.
pub fn identity_from_headers(
    headers: &std::collections::HashMap<String, Vec<String>>,
) -> IdentityResult<Option<SignedIdentity>> {
    let Some(values) = headers.get(IDENTITY_HEADER) else {
        return Ok(None);
    };
    match values.first().map(String::as_str) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(SignedIdentity::from_header_value(value)?)),
    }
}
