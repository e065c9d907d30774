//! Blocks, transactions, and signature headers.
//!
//! Field names are camelCase on the wire so policy documents can reference
//! them directly (`input.transactions[_].setDataPayload.path`). The
//! canonical byte form of every structure is DAG-CBOR.

use std::collections::BTreeMap;

use cid::Cid;
use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};

use crate::error::{ChainTreeError, ChainTreeResult};

/// Payload of a `setData` transaction: write `value` (canonical CBOR bytes)
/// at `path` under the tree's data subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDataPayload {
    pub path: String,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

impl SetDataPayload {
    /// Decode the payload value.
    pub fn decode_value(&self) -> ChainTreeResult<Ipld> {
        serde_ipld_dagcbor::from_slice(&self.value).map_err(|e| ChainTreeError::Codec(e.to_string()))
    }
}

/// Payload of a `setOwnership` transaction: replace the tree's authorized
/// owner list with `authentication` (addresses or DIDs).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOwnershipPayload {
    pub authentication: Vec<String>,
}

/// Transaction type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "setData")]
    SetData,
    #[serde(rename = "setOwnership")]
    SetOwnership,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetData => write!(f, "setData"),
            Self::SetOwnership => write!(f, "setOwnership"),
        }
    }
}

/// A single state transition inside a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_data_payload: Option<SetDataPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_ownership_payload: Option<SetOwnershipPayload>,
}

impl Transaction {
    /// Build a `setData` transaction, encoding `value` canonically.
    pub fn set_data(path: impl Into<String>, value: &Ipld) -> ChainTreeResult<Self> {
        let bytes =
            serde_ipld_dagcbor::to_vec(value).map_err(|e| ChainTreeError::Codec(e.to_string()))?;
        Ok(Self {
            kind: TransactionKind::SetData,
            set_data_payload: Some(SetDataPayload {
                path: path.into(),
                value: bytes,
            }),
            set_ownership_payload: None,
        })
    }

    /// Build a `setOwnership` transaction.
    pub fn set_ownership(authentication: Vec<String>) -> Self {
        Self {
            kind: TransactionKind::SetOwnership,
            set_data_payload: None,
            set_ownership_payload: Some(SetOwnershipPayload { authentication }),
        }
    }
}

/// An unsigned batch of transactions advancing a tree from `previous_tip`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Tip the block builds on; `None` only for genesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_tip: Option<Cid>,
    /// Monotone block counter, 0 for genesis.
    pub height: u64,
    pub transactions: Vec<Transaction>,
}

/// Signature headers binding a block to one or more owner addresses.
///
/// Keys are address text forms; values are 65-byte recoverable signatures
/// over the block's canonical hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeaders {
    pub signatures: BTreeMap<String, serde_bytes::ByteBuf>,
}

/// A block plus its signature headers; the unit carried by an ABR payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockWithHeaders {
    pub block: Block,
    pub headers: BlockHeaders,
}

impl BlockWithHeaders {
    /// Canonical DAG-CBOR bytes of the whole signed block.
    pub fn to_bytes(&self) -> ChainTreeResult<Vec<u8>> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| ChainTreeError::Codec(e.to_string()))
    }

    /// Parse from canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> ChainTreeResult<Self> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| ChainTreeError::Codec(e.to_string()))
    }

    /// The generic structural map handed to policy evaluation.
    ///
    /// Block fields are hoisted to the top level so policies read
    /// `input.height` and `input.transactions`, not `input.block.height`.
    pub fn to_policy_input(&self) -> ChainTreeResult<serde_json::Value> {
        let mut map = serde_json::Map::new();
        if let Some(tip) = &self.block.previous_tip {
            map.insert("previousTip".to_string(), tip.to_string().into());
        }
        map.insert("height".to_string(), self.block.height.into());
        map.insert(
            "transactions".to_string(),
            serde_json::to_value(&self.block.transactions)
                .map_err(|e| ChainTreeError::Codec(e.to_string()))?,
        );
        map.insert(
            "headers".to_string(),
            serde_json::to_value(&self.headers).map_err(|e| ChainTreeError::Codec(e.to_string()))?,
        );
        Ok(serde_json::Value::Object(map))
    }
}
