//! The identity claim and its signed form.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use arbor_types::Address;

use crate::error::{IdentityError, IdentityResult};

/// An unsigned identity claim, modeled on JWT registered claims.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Issuer, usually a DID.
    pub iss: String,
    /// Subject, usually a DID; verification resolves this tree's owners.
    pub sub: String,
    /// Audience; available to policies, unused by the aggregator itself.
    pub aud: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
}

impl Identity {
    /// Canonical hash of the unsigned claim: SHA2-256 over its DAG-CBOR
    /// bytes. This is the message every identity signature covers.
    pub fn canonical_hash(&self) -> IdentityResult<[u8; 32]> {
        let bytes =
            serde_ipld_dagcbor::to_vec(self).map_err(|e| IdentityError::Codec(e.to_string()))?;
        Ok(Sha256::digest(&bytes).into())
    }

    /// Sign the claim, appending the recovery byte to the signature.
    pub fn sign(&self, key: &SigningKey) -> IdentityResult<SignedIdentity> {
        let digest = self.canonical_hash()?;
        let (signature, recovery) =
            key.sign_prehash_recoverable(&digest)
                .map_err(|e| IdentityError::Signing {
                    reason: e.to_string(),
                })?;
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery.to_byte());
        Ok(SignedIdentity {
            identity: self.clone(),
            signature: serde_bytes::ByteBuf::from(bytes),
        })
    }

    /// The claim as a policy input fragment.
    pub fn to_policy_value(&self) -> serde_json::Value {
        serde_json::json!({
            "iss": self.iss,
            "sub": self.sub,
            "aud": self.aud,
            "exp": self.exp,
            "iat": self.iat,
        })
    }
}

/// An identity claim plus its recoverable signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIdentity {
    pub identity: Identity,
    /// 65 bytes: 64-byte ECDSA signature plus the recovery byte.
    pub signature: serde_bytes::ByteBuf,
}

impl SignedIdentity {
    /// Recover the address that produced this signature.
    ///
    /// Structural problems (wrong length, bad recovery byte, unrecoverable
    /// point) are errors; a *wrong* signer is only discovered later, when
    /// the address is checked against the subject's owner set.
    pub fn address(&self) -> IdentityResult<Address> {
        if self.signature.len() != 65 {
            return Err(IdentityError::MalformedSignature {
                reason: format!("expected 65 bytes, got {}", self.signature.len()),
            });
        }
        let digest = self.identity.canonical_hash()?;
        let signature = Signature::from_slice(&self.signature[..64]).map_err(|e| {
            IdentityError::MalformedSignature {
                reason: e.to_string(),
            }
        })?;
        let recovery = RecoveryId::from_byte(self.signature[64]).ok_or_else(|| {
            IdentityError::MalformedSignature {
                reason: format!("invalid recovery byte {}", self.signature[64]),
            }
        })?;
        let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery).map_err(
            |e| IdentityError::MalformedSignature {
                reason: format!("recovery failed: {e}"),
            },
        )?;
        let point = key.to_encoded_point(false);
        Ok(Address::from_uncompressed_key(point.as_bytes())?)
    }

    /// Canonical DAG-CBOR bytes of the signed claim.
    pub fn to_bytes(&self) -> IdentityResult<Vec<u8>> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| IdentityError::Codec(e.to_string()))
    }

    /// Parse from canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| IdentityError::Codec(e.to_string()))
    }
}
