//! Recoverable block signatures.
//!
//! Blocks are signed with recoverable ECDSA over secp256k1. The signed
//! message is the SHA2-256 of the block's canonical DAG-CBOR bytes; the
//! recovery byte is appended as the 65th signature byte so verifiers can
//! recover the signer's address without a stored public key.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use arbor_types::Address;

use crate::block::{Block, BlockHeaders, BlockWithHeaders};
use crate::error::{ChainTreeError, ChainTreeResult};

/// SHA2-256 over a block's canonical bytes; the message every block
/// signature covers.
pub fn block_hash(block: &Block) -> ChainTreeResult<[u8; 32]> {
    let bytes =
        serde_ipld_dagcbor::to_vec(block).map_err(|e| ChainTreeError::Codec(e.to_string()))?;
    Ok(Sha256::digest(&bytes).into())
}

/// Derive the address for a verifying key.
pub fn key_address(key: &VerifyingKey) -> ChainTreeResult<Address> {
    let point = key.to_encoded_point(false);
    Address::from_uncompressed_key(point.as_bytes()).map_err(Into::into)
}

/// Sign a block, producing headers that bind it to the signer's address.
pub fn sign_block(block: &Block, key: &SigningKey) -> ChainTreeResult<BlockWithHeaders> {
    let digest = block_hash(block)?;
    let (signature, recovery) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| ChainTreeError::Signature {
            reason: e.to_string(),
        })?;

    let mut sig_bytes = signature.to_bytes().to_vec();
    sig_bytes.push(recovery.to_byte());

    let address = key_address(key.verifying_key())?;
    let mut headers = BlockHeaders::default();
    headers
        .signatures
        .insert(address.to_string(), serde_bytes::ByteBuf::from(sig_bytes));

    Ok(BlockWithHeaders {
        block: block.clone(),
        headers,
    })
}

/// Recover the signer address from every signature header.
///
/// Each recovered address must equal the header key it was stored under;
/// a mismatch means the header lies about its signer and fails the whole
/// recovery.
pub fn recover_signers(bwh: &BlockWithHeaders) -> ChainTreeResult<Vec<Address>> {
    let digest = block_hash(&bwh.block)?;
    let mut signers = Vec::with_capacity(bwh.headers.signatures.len());

    for (claimed, sig_bytes) in &bwh.headers.signatures {
        if sig_bytes.len() != 65 {
            return Err(ChainTreeError::Signature {
                reason: format!("expected 65-byte signature, got {}", sig_bytes.len()),
            });
        }
        let signature =
            Signature::from_slice(&sig_bytes[..64]).map_err(|e| ChainTreeError::Signature {
                reason: e.to_string(),
            })?;
        let recovery =
            RecoveryId::from_byte(sig_bytes[64]).ok_or_else(|| ChainTreeError::Signature {
                reason: format!("invalid recovery byte {}", sig_bytes[64]),
            })?;
        let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery).map_err(
            |e| ChainTreeError::Signature {
                reason: format!("recovery failed: {e}"),
            },
        )?;
        let recovered = key_address(&key)?;
        if recovered.to_string() != *claimed {
            return Err(ChainTreeError::Signature {
                reason: format!("header claims {claimed} but signature recovers {recovered}"),
            });
        }
        signers.push(recovered);
    }

    Ok(signers)
}
