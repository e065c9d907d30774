//! Immutable DAG nodes and their content addresses.
//!
//! A [`Node`] pairs canonical DAG-CBOR bytes with the CID computed from
//! them. Nodes can only be constructed through encoding or verified
//! decoding, so the pairing can never be wrong.

use cid::Cid;
use ipld_core::ipld::Ipld;
use multihash::Multihash;
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Multicodec code for DAG-CBOR.
const DAG_CBOR: u64 = 0x71;
/// Multicodec code for the SHA2-256 multihash.
const SHA2_256: u64 = 0x12;

/// Compute the CIDv1 (dag-cbor, sha2-256) for a node's canonical bytes.
pub fn cid_for_bytes(bytes: &[u8]) -> Cid {
    let digest = Sha256::digest(bytes);
    let mh = Multihash::<64>::wrap(SHA2_256, &digest).expect("32-byte digest always fits");
    Cid::new_v1(DAG_CBOR, mh)
}

/// An immutable, content-addressed DAG node.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    cid: Cid,
    bytes: Vec<u8>,
}

impl Node {
    /// Encode an IPLD value into its canonical node form.
    pub fn from_ipld(value: &Ipld) -> StoreResult<Self> {
        let bytes =
            serde_ipld_dagcbor::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;
        let cid = cid_for_bytes(&bytes);
        Ok(Self { cid, bytes })
    }

    /// Wrap raw node bytes, verifying they decode as DAG-CBOR.
    pub fn from_bytes(bytes: Vec<u8>) -> StoreResult<Self> {
        let _: Ipld =
            serde_ipld_dagcbor::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
        let cid = cid_for_bytes(&bytes);
        Ok(Self { cid, bytes })
    }

    /// Wrap raw node bytes that arrive with a claimed CID, rejecting a
    /// mismatch.
    pub fn from_bytes_claimed(bytes: Vec<u8>, claimed: &Cid) -> StoreResult<Self> {
        let node = Self::from_bytes(bytes)?;
        if node.cid != *claimed {
            return Err(StoreError::CidMismatch {
                claimed: *claimed,
                computed: node.cid,
            });
        }
        Ok(node)
    }

    /// The node's content address.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// The canonical DAG-CBOR bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the node payload.
    pub fn ipld(&self) -> StoreResult<Ipld> {
        serde_ipld_dagcbor::from_slice(&self.bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("cid", &self.cid.to_string())
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_ipld() -> Ipld {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Ipld::String("arbor".to_string()));
        map.insert("height".to_string(), Ipld::Integer(3));
        Ipld::Map(map)
    }

    #[test]
    fn cid_is_deterministic() {
        let n1 = Node::from_ipld(&sample_ipld()).unwrap();
        let n2 = Node::from_ipld(&sample_ipld()).unwrap();
        assert_eq!(n1.cid(), n2.cid());
        assert_eq!(n1.bytes(), n2.bytes());
    }

    #[test]
    fn different_payloads_different_cids() {
        let n1 = Node::from_ipld(&Ipld::String("a".into())).unwrap();
        let n2 = Node::from_ipld(&Ipld::String("b".into())).unwrap();
        assert_ne!(n1.cid(), n2.cid());
    }

    #[test]
    fn bytes_roundtrip_preserves_cid() {
        let original = Node::from_ipld(&sample_ipld()).unwrap();
        let reparsed = Node::from_bytes(original.bytes().to_vec()).unwrap();
        assert_eq!(original.cid(), reparsed.cid());
        assert_eq!(original.ipld().unwrap(), reparsed.ipld().unwrap());
    }

    #[test]
    fn claimed_cid_must_match() {
        let a = Node::from_ipld(&Ipld::String("a".into())).unwrap();
        let b = Node::from_ipld(&Ipld::String("b".into())).unwrap();

        assert!(Node::from_bytes_claimed(a.bytes().to_vec(), a.cid()).is_ok());
        let err = Node::from_bytes_claimed(a.bytes().to_vec(), b.cid()).unwrap_err();
        assert!(matches!(err, StoreError::CidMismatch { .. }));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(Node::from_bytes(vec![0xff, 0x00, 0x01]).is_err());
    }

    #[test]
    fn links_roundtrip() {
        let child = Node::from_ipld(&Ipld::String("child".into())).unwrap();
        let mut map = BTreeMap::new();
        map.insert("child".to_string(), Ipld::Link(*child.cid()));
        let parent = Node::from_ipld(&Ipld::Map(map)).unwrap();

        match parent.ipld().unwrap() {
            Ipld::Map(m) => match m.get("child") {
                Some(Ipld::Link(cid)) => assert_eq!(cid, child.cid()),
                other => panic!("expected link, got {other:?}"),
            },
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn cid_is_v1_dagcbor() {
        let node = Node::from_ipld(&sample_ipld()).unwrap();
        assert_eq!(node.cid().version(), cid::Version::V1);
        assert_eq!(node.cid().codec(), 0x71);
    }
}
