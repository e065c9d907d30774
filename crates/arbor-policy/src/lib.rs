//! Declarative write/read policies for Arbor.
//!
//! Policies are authored in a small Datalog-style rule language (a subset of
//! the language the wider ecosystem uses for authorization rules): modules
//! declare a `package`, rules may carry `default` values, bodies are
//! conjunctions of equality, negation, built-in calls, and wildcard
//! expansion over an `input` document.
//!
//! ```text
//! package main
//! default allow = true
//!
//! allow = false {
//!     contains(input.transactions[_].setDataPayload.path, "forbidden")
//! }
//! ```
//!
//! A [`PreparedQuery`] binds query variables (`allow = data.main.allow`)
//! against compiled modules; evaluation yields bindings or *undefined*,
//! which callers treat as deny.
//!
//! The [`extract`] module reads policy bundles out of a ChainTree at
//! `tree/data/.well-known/policies` and runs the two-phase "wants" protocol:
//! evaluate once, resolve the paths the policy asked for (cross-object paths
//! included), then evaluate again with `input.paths` filled in.

pub mod ast;
pub mod engine;
pub mod error;
pub mod eval;
pub mod extract;
pub mod lexer;
pub mod parser;

pub use engine::{compile, Bindings, PreparedQuery};
pub use error::{PolicyError, PolicyResult};
pub use extract::{
    evaluate_with_wants, policy_from_tree, TreePolicy, POLICY_PATH, READ_MAIN_MODULE,
    READ_WANTS_MODULE, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE,
};
