use thiserror::Error;

use arbor_dag::DagError;

/// Errors from policy compilation and evaluation.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A module failed to tokenize or parse.
    #[error("policy module {module} failed to compile: {reason}")]
    Compile { module: String, reason: String },

    /// The query string failed to parse.
    #[error("policy query failed to compile: {reason}")]
    BadQuery { reason: String },

    /// The policy bundle stored in the tree is malformed.
    #[error("malformed policy bundle: {reason}")]
    MalformedBundle { reason: String },

    /// Evaluation input was malformed (e.g. a non-string wants entry).
    #[error("policy input error: {reason}")]
    Input { reason: String },

    /// Evaluation failed (recursive rules, non-boolean allow, ...).
    #[error("policy evaluation error: {reason}")]
    Eval { reason: String },

    /// Evaluation exceeded the configured step budget.
    #[error("policy evaluation exceeded {steps} steps")]
    StepBudgetExceeded { steps: usize },

    /// A wants path could not be resolved.
    #[error(transparent)]
    Dag(#[from] DagError),
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
