//! Foundation types for the Arbor aggregator.
//!
//! This crate provides the identity and control primitives shared by every
//! other Arbor crate.
//!
//! # Key Types
//!
//! - [`Did`] — Decentralized identifier naming a ChainTree
//! - [`Address`] — 20-byte account address derived from a secp256k1 key
//! - [`CancelToken`] — Cooperative cancellation for long-running operations
//! - [`TypeError`] — Parse/validation errors for the above

pub mod cancel;
pub mod did;
pub mod error;

pub use cancel::CancelToken;
pub use did::{Address, Did, DID_PREFIX};
pub use error::TypeError;
