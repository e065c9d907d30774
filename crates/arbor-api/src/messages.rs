//! Request and response shapes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use arbor_aggregator::{AddResponse, ResolveResponse};
use arbor_chaintree::AddBlockRequest;
use arbor_dag::ipld_to_json;
use arbor_store::Node;

use crate::error::{ApiError, ApiResult};

/// A node on the wire: text CID plus base64 of the raw canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub cid: String,
    pub data: String,
}

impl BlockRecord {
    /// Encode a node.
    pub fn from_node(node: &Node) -> Self {
        Self {
            cid: node.cid().to_string(),
            data: BASE64.encode(node.bytes()),
        }
    }

    /// Decode back into a node, verifying bytes against the carried CID.
    pub fn to_node(&self) -> ApiResult<Node> {
        let bytes = BASE64
            .decode(&self.data)
            .map_err(|e| ApiError::Base64(e.to_string()))?;
        let node = Node::from_bytes(bytes).map_err(|e| ApiError::Payload(e.to_string()))?;
        if node.cid().to_string() != self.cid {
            return Err(ApiError::Payload(format!(
                "record claims {} but bytes hash to {}",
                self.cid,
                node.cid()
            )));
        }
        Ok(node)
    }
}

/// `Resolve{did, path}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub did: String,
    pub path: String,
}

impl ResolveRequest {
    /// The path as segments, the way the core consumes it.
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Reply to a resolve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReply {
    pub remaining_path: Vec<String>,
    pub value: serde_json::Value,
    pub touched_blocks: Vec<BlockRecord>,
}

impl ResolveReply {
    /// Encode a core resolve response.
    pub fn from_response(response: &ResolveResponse) -> Self {
        Self {
            remaining_path: response.remaining_path.clone(),
            value: response
                .value
                .as_ref()
                .map(ipld_to_json)
                .unwrap_or(serde_json::Value::Null),
            touched_blocks: response
                .touched_blocks
                .iter()
                .map(BlockRecord::from_node)
                .collect(),
        }
    }
}

/// `AddBlock{abr_bytes_base64}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlockRequestWire {
    pub add_block_request: String,
}

impl AddBlockRequestWire {
    /// Encode an ABR for transport.
    pub fn from_abr(abr: &AddBlockRequest) -> ApiResult<Self> {
        let bytes = abr.to_bytes().map_err(|e| ApiError::Payload(e.to_string()))?;
        Ok(Self {
            add_block_request: BASE64.encode(bytes),
        })
    }

    /// Decode the carried ABR.
    pub fn to_abr(&self) -> ApiResult<AddBlockRequest> {
        let bytes = BASE64
            .decode(&self.add_block_request)
            .map_err(|e| ApiError::Base64(e.to_string()))?;
        AddBlockRequest::from_bytes(&bytes).map_err(|e| ApiError::Payload(e.to_string()))
    }
}

/// Reply to an add-block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlockReply {
    pub valid: bool,
    pub new_tip: String,
    pub new_blocks: Vec<BlockRecord>,
}

impl AddBlockReply {
    /// Encode a core add response.
    pub fn from_response(response: &AddResponse) -> Self {
        Self {
            valid: response.is_valid,
            new_tip: response
                .new_tip
                .map(|tip| tip.to_string())
                .unwrap_or_default(),
            new_blocks: response
                .new_nodes
                .iter()
                .map(BlockRecord::from_node)
                .collect(),
        }
    }
}
