//! The per-tree write policy, plugged into block validation.

use tracing::debug;

use arbor_chaintree::{
    BlockValidatorFn, BlockWithHeaders, ChainTree, ChainTreeError, ValidatorDecision,
};
use arbor_dag::DagGetter;
use arbor_policy::{
    evaluate_with_wants, policy_from_tree, PolicyError, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE,
};

/// Build the block-validator function enforcing each tree's own write
/// policy (`main`/`wants` modules at `tree/data/.well-known/policies`).
///
/// Trees without a policy allow everything; a denial rejects the block.
pub fn tree_write_policy_validator() -> BlockValidatorFn {
    std::sync::Arc::new(
        |tree: &ChainTree, bwh: &BlockWithHeaders, getter: &dyn DagGetter| {
            let policy = policy_from_tree(tree.dag(), WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
                .map_err(policy_to_validator_error)?;
            let Some(policy) = policy else {
                return Ok(ValidatorDecision::Allow);
            };

            let input = bwh.to_policy_input()?;
            let allowed = evaluate_with_wants(&policy, tree.dag(), getter, &input)
                .map_err(policy_to_validator_error)?;
            debug!(did = %tree.did(), allowed, "tree write policy");
            if allowed {
                Ok(ValidatorDecision::Allow)
            } else {
                Ok(ValidatorDecision::Deny("tree write policy denied".into()))
            }
        },
    )
}

fn policy_to_validator_error(err: PolicyError) -> ChainTreeError {
    ChainTreeError::Validator {
        reason: err.to_string(),
    }
}
