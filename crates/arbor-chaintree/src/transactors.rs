//! The transactor registry: transaction type → DAG transformation.
//!
//! Each transactor takes the current DAG and one transaction and produces a
//! new root plus the nodes it created. The registry is part of the notary
//! configuration, so deployments can extend the transaction set without
//! touching the validator.

use std::collections::BTreeMap;

use cid::Cid;

use arbor_dag::Dag;
use arbor_store::Node;

use crate::block::{Transaction, TransactionKind};
use crate::error::{ChainTreeError, ChainTreeResult};
use crate::tree::{AUTHENTICATIONS_PATH, DATA_LABEL, TREE_LABEL};

/// A pure transformation applying one transaction to a DAG.
pub type TransactorFn = fn(&Dag, &Transaction) -> ChainTreeResult<(Cid, Vec<Node>)>;

/// Registry mapping transaction kinds to their transactors.
pub struct TransactorRegistry {
    transactors: BTreeMap<TransactionKind, TransactorFn>,
}

impl TransactorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            transactors: BTreeMap::new(),
        }
    }

    /// The default registry: `setData` and `setOwnership`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TransactionKind::SetData, set_data);
        registry.register(TransactionKind::SetOwnership, set_ownership);
        registry
    }

    /// Register (or replace) a transactor.
    pub fn register(&mut self, kind: TransactionKind, transactor: TransactorFn) {
        self.transactors.insert(kind, transactor);
    }

    /// Apply one transaction, failing if its kind has no transactor.
    pub fn apply(&self, dag: &Dag, tx: &Transaction) -> ChainTreeResult<(Cid, Vec<Node>)> {
        let transactor =
            self.transactors
                .get(&tx.kind)
                .ok_or_else(|| ChainTreeError::MissingPayload {
                    kind: format!("no transactor registered for {}", tx.kind),
                })?;
        transactor(dag, tx)
    }

    /// Number of registered transactors.
    pub fn len(&self) -> usize {
        self.transactors.len()
    }

    /// Returns `true` if no transactors are registered.
    pub fn is_empty(&self) -> bool {
        self.transactors.is_empty()
    }
}

impl Default for TransactorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// `setData`: write the payload value under `tree/data/<path>`.
fn set_data(dag: &Dag, tx: &Transaction) -> ChainTreeResult<(Cid, Vec<Node>)> {
    let payload = tx
        .set_data_payload
        .as_ref()
        .ok_or_else(|| ChainTreeError::MissingPayload {
            kind: TransactionKind::SetData.to_string(),
        })?;
    let value = payload.decode_value()?;

    let mut path = vec![TREE_LABEL.to_string(), DATA_LABEL.to_string()];
    path.extend(
        payload
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    );
    Ok(dag.set_at(&path, value)?)
}

/// `setOwnership`: replace `tree/_tupelo/authentications`.
fn set_ownership(dag: &Dag, tx: &Transaction) -> ChainTreeResult<(Cid, Vec<Node>)> {
    let payload =
        tx.set_ownership_payload
            .as_ref()
            .ok_or_else(|| ChainTreeError::MissingPayload {
                kind: TransactionKind::SetOwnership.to_string(),
            })?;
    let auths = ipld_core::ipld::Ipld::List(
        payload
            .authentication
            .iter()
            .map(|a| ipld_core::ipld::Ipld::String(a.clone()))
            .collect(),
    );
    let path: Vec<String> = AUTHENTICATIONS_PATH.iter().map(|s| s.to_string()).collect();
    Ok(dag.set_at(&path, auths)?)
}
