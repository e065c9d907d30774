//! Signed identity claims for Arbor read controls.
//!
//! An [`Identity`] is a small JWT-shaped claim (`iss`, `sub`, `aud`, `exp`,
//! `iat`) signed with recoverable secp256k1 ECDSA over the canonical hash
//! of the unsigned claim. Verification recovers the signer's address and
//! checks it against the grafted owner set of the `sub` tree, so holding a
//! key that owns (directly or transitively) the subject tree is what makes
//! an identity valid.
//!
//! JWT and HTTP-signature schemes were a poor fit here: the only identifier
//! a ChainTree carries is an address on the secp256k1 curve, so the claim
//! format is custom but modeled on JWTs.

pub mod claim;
pub mod error;
pub mod transport;
pub mod verify;

pub use claim::{Identity, SignedIdentity};
pub use error::{IdentityError, IdentityResult};
pub use transport::{identity_from_headers, IDENTITY_HEADER};
pub use verify::verify_identity;
