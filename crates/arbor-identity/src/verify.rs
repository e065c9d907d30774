//! Identity verification against grafted tree ownership.

use tracing::debug;

use arbor_chaintree::{resolve_owners, ChainTree};
use arbor_dag::DagGetter;
use arbor_types::Did;

use crate::claim::SignedIdentity;
use crate::error::{IdentityError, IdentityResult};

/// Verify a signed identity claim.
///
/// Steps: recover the signer's address from the claim signature, reject
/// expired claims (`now > exp`), resolve the grafted owner set of the
/// claimed subject tree, and accept iff the recovered address is a member.
/// `now` is seconds since the epoch, injected so callers control the clock.
///
/// Returns `Ok(false)` for claims that are well-formed but wrong (expired,
/// unauthorized); structural problems are errors.
pub fn verify_identity(
    signed: &SignedIdentity,
    getter: &dyn DagGetter,
    now: i64,
) -> IdentityResult<bool> {
    let address = signed.address()?;

    if now > signed.identity.exp {
        debug!(sub = %signed.identity.sub, exp = signed.identity.exp, "identity expired");
        return Ok(false);
    }

    let sub = Did::parse(signed.identity.sub.clone())?;
    let dag = getter
        .get_latest(&sub)
        .map_err(|e| IdentityError::Ownership(e.to_string()))?
        .ok_or_else(|| IdentityError::UnknownSubject {
            did: sub.as_str().to_string(),
        })?;

    let tree = ChainTree::from_parts(sub.clone(), dag);
    let owners =
        resolve_owners(&tree, getter).map_err(|e| IdentityError::Ownership(e.to_string()))?;

    let authorized = owners.contains(&address);
    debug!(sub = %sub, %address, authorized, "identity verification");
    Ok(authorized)
}
