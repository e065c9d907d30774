use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::TypeError;

/// Prefix shared by every ChainTree DID.
pub const DID_PREFIX: &str = "did:tupelo:";

/// A 20-byte account address derived from a secp256k1 public key.
///
/// The derivation is the Keccak-256 hash of the uncompressed public key
/// (without the 0x04 tag byte), keeping the final 20 bytes. The text form is
/// `0x` followed by 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Derive an address from an uncompressed SEC1 public key (65 bytes,
    /// leading 0x04).
    pub fn from_uncompressed_key(sec1: &[u8]) -> Result<Self, TypeError> {
        if sec1.len() != 65 || sec1[0] != 0x04 {
            return Err(TypeError::InvalidPublicKey {
                reason: format!("expected 65-byte uncompressed key, got {} bytes", sec1.len()),
            });
        }
        let digest = Keccak256::digest(&sec1[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Ok(Self(addr))
    }

    /// Create from raw 20 bytes.
    pub const fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse from the `0x`-prefixed hex text form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let stripped = s
            .strip_prefix("0x")
            .ok_or_else(|| TypeError::InvalidAddress {
                address: s.to_string(),
                reason: "missing 0x prefix".into(),
            })?;
        let bytes = hex::decode(stripped).map_err(|e| TypeError::InvalidAddress {
            address: s.to_string(),
            reason: e.to_string(),
        })?;
        if bytes.len() != 20 {
            return Err(TypeError::InvalidAddress {
                address: s.to_string(),
                reason: format!("expected 20 bytes, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// A decentralized identifier naming a ChainTree.
///
/// DIDs are opaque strings of the form `did:tupelo:<address>`. For a genesis
/// tree the embedded address is derived from the owner's public key, which
/// lets the aggregator authorize the very first block without any stored
/// state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Wrap an existing DID string. The string is validated for the prefix
    /// only; address extraction can still fail later for exotic DIDs.
    pub fn parse(s: impl Into<String>) -> Result<Self, TypeError> {
        let s = s.into();
        if !s.starts_with(DID_PREFIX) {
            return Err(TypeError::InvalidDid {
                did: s,
                reason: format!("missing {DID_PREFIX} prefix"),
            });
        }
        Ok(Self(s))
    }

    /// The DID for an address.
    pub fn from_address(addr: &Address) -> Self {
        Self(format!("{DID_PREFIX}{addr}"))
    }

    /// The DID for an uncompressed secp256k1 public key.
    pub fn from_uncompressed_key(sec1: &[u8]) -> Result<Self, TypeError> {
        Ok(Self::from_address(&Address::from_uncompressed_key(sec1)?))
    }

    /// Construct from raw UTF-8 bytes (the ABR wire form).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let s = std::str::from_utf8(bytes).map_err(|e| TypeError::InvalidDid {
            did: String::from_utf8_lossy(bytes).into_owned(),
            reason: e.to_string(),
        })?;
        Self::parse(s)
    }

    /// The full DID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID as raw bytes (the ABR wire form).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The address embedded in the DID, when present.
    pub fn address(&self) -> Result<Address, TypeError> {
        let rest = self.0.strip_prefix(DID_PREFIX).unwrap_or(&self.0);
        Address::parse(rest)
    }

    /// Returns `true` if a string carries the DID prefix. Used by the DAG
    /// walker to spot cross-object links.
    pub fn is_did_str(s: &str) -> bool {
        s.starts_with(DID_PREFIX)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}
