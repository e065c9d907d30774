//! The add-block request wire message.

use cid::Cid;
use serde::{Deserialize, Serialize};

use arbor_types::Did;

use crate::block::BlockWithHeaders;
use crate::error::{ChainTreeError, ChainTreeResult};

/// A client's proposal to advance an object from `previous_tip` to a new
/// tip.
///
/// `state` carries the serialized nodes the client claims are produced by
/// applying the block; the validator recomputes and the aggregator persists
/// both sets. `new_tip` is filled in by validation, never trusted from the
/// client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlockRequest {
    /// DID of the object, as raw UTF-8 bytes.
    #[serde(with = "serde_bytes")]
    pub object_id: Vec<u8>,
    /// CID bytes of the tip this request builds on; empty for a brand-new
    /// object.
    #[serde(with = "serde_bytes")]
    pub previous_tip: Vec<u8>,
    /// Height of the carried block.
    pub height: u64,
    /// CID bytes of the validated new tip (output field).
    #[serde(with = "serde_bytes")]
    pub new_tip: Vec<u8>,
    /// Canonical CBOR of the [`BlockWithHeaders`].
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Serialized nodes claimed to back the new tip.
    pub state: Vec<serde_bytes::ByteBuf>,
}

impl AddBlockRequest {
    /// Canonical DAG-CBOR bytes.
    pub fn to_bytes(&self) -> ChainTreeResult<Vec<u8>> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| ChainTreeError::Codec(e.to_string()))
    }

    /// Parse from canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> ChainTreeResult<Self> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| ChainTreeError::Codec(e.to_string()))
    }

    /// The object DID.
    pub fn did(&self) -> ChainTreeResult<Did> {
        Ok(Did::from_bytes(&self.object_id)?)
    }

    /// The previous tip as a CID, `None` when the field is empty.
    pub fn previous_tip_cid(&self) -> ChainTreeResult<Option<Cid>> {
        if self.previous_tip.is_empty() {
            return Ok(None);
        }
        Cid::try_from(self.previous_tip.as_slice())
            .map(Some)
            .map_err(|e| ChainTreeError::Codec(format!("previous tip is not a CID: {e}")))
    }

    /// The carried block.
    pub fn block(&self) -> ChainTreeResult<BlockWithHeaders> {
        BlockWithHeaders::from_bytes(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockHeaders};

    fn sample_abr() -> AddBlockRequest {
        let bwh = BlockWithHeaders {
            block: Block {
                previous_tip: None,
                height: 0,
                transactions: vec![],
            },
            headers: BlockHeaders::default(),
        };
        AddBlockRequest {
            object_id: b"did:tupelo:0x0000000000000000000000000000000000000001".to_vec(),
            previous_tip: Vec::new(),
            height: 0,
            new_tip: Vec::new(),
            payload: bwh.to_bytes().unwrap(),
            state: vec![serde_bytes::ByteBuf::from(vec![1u8, 2, 3])],
        }
    }

    #[test]
    fn bytes_roundtrip() {
        let abr = sample_abr();
        let bytes = abr.to_bytes().unwrap();
        let parsed = AddBlockRequest::from_bytes(&bytes).unwrap();
        assert_eq!(abr, parsed);
    }

    #[test]
    fn did_parses() {
        let abr = sample_abr();
        assert_eq!(
            abr.did().unwrap().as_str(),
            "did:tupelo:0x0000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn empty_previous_tip_is_none() {
        assert_eq!(sample_abr().previous_tip_cid().unwrap(), None);
    }

    #[test]
    fn garbage_previous_tip_errors() {
        let mut abr = sample_abr();
        abr.previous_tip = b"junk".to_vec();
        assert!(abr.previous_tip_cid().is_err());
    }

    #[test]
    fn payload_decodes_to_block() {
        let abr = sample_abr();
        let block = abr.block().unwrap();
        assert_eq!(block.block.height, 0);
    }
}
