//! ChainTrees: append-only signed objects whose state is a Merkle DAG.
//!
//! A ChainTree advances by applying signed [`Block`]s of transactions to its
//! current root. This crate provides the block and transaction model, the
//! transactor registry that applies transactions to a DAG, recoverable
//! block signatures, grafted ownership resolution, and the block validator
//! that turns an [`AddBlockRequest`] into a candidate new tip.

pub mod abr;
pub mod block;
pub mod error;
pub mod ownership;
pub mod process;
pub mod signing;
pub mod transactors;
pub mod tree;
pub mod validate;

pub use abr::AddBlockRequest;
pub use block::{
    Block, BlockHeaders, BlockWithHeaders, SetDataPayload, SetOwnershipPayload, Transaction,
    TransactionKind,
};
pub use error::{ChainTreeError, ChainTreeResult};
pub use ownership::resolve_owners;
pub use process::{process_block, ProcessedBlock};
pub use signing::{recover_signers, sign_block};
pub use transactors::{TransactorFn, TransactorRegistry};
pub use tree::ChainTree;
pub use validate::{BlockValidator, BlockValidatorFn, Validated, ValidatorDecision};
