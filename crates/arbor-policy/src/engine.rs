//! Prepared queries over compiled module sets.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::Expr;
use crate::error::PolicyResult;
use crate::eval::{Evaluator, ModuleSet, DEFAULT_STEP_BUDGET};
use crate::parser::{parse_module, parse_query};

/// Variable bindings produced by a query evaluation.
pub type Bindings = BTreeMap<String, Value>;

/// A compiled set of modules plus a parsed query, ready for repeated
/// evaluation.
#[derive(Debug)]
pub struct PreparedQuery {
    modules: ModuleSet,
    query: Vec<(String, Expr)>,
    step_budget: usize,
}

/// Compile named module sources and a query string.
///
/// Module map keys are advisory; packages are taken from each module's own
/// `package` declaration.
pub fn compile(modules: &BTreeMap<String, String>, query: &str) -> PolicyResult<PreparedQuery> {
    let mut compiled = Vec::with_capacity(modules.len());
    for (name, source) in modules {
        compiled.push(parse_module(name, source)?);
    }
    Ok(PreparedQuery {
        modules: ModuleSet::new(compiled),
        query: parse_query(query)?,
        step_budget: DEFAULT_STEP_BUDGET,
    })
}

impl PreparedQuery {
    /// Override the evaluation step budget.
    pub fn with_step_budget(mut self, steps: usize) -> Self {
        self.step_budget = steps;
        self
    }

    /// Returns `true` if a package with this path was compiled in.
    pub fn has_package(&self, package: &str) -> bool {
        self.modules.has_package(package)
    }

    /// Evaluate the query against an input document.
    ///
    /// Returns `Ok(None)` when any query variable is *undefined* — the
    /// empty result set, which callers treat as deny.
    pub fn eval(&self, input: &Value) -> PolicyResult<Option<Bindings>> {
        let evaluator = Evaluator::new(&self.modules, input, self.step_budget);
        let mut bindings = Bindings::new();
        for (name, target) in &self.query {
            let values = evaluator.eval_expr(target, &BTreeMap::new(), "")?;
            match values.into_iter().next() {
                Some(value) => {
                    bindings.insert(name.clone(), value);
                }
                None => return Ok(None),
            }
        }
        Ok(Some(bindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn single_binding_query() {
        let prepared = compile(
            &bundle(&[(
                "main",
                r#"
                package main
                default allow = true
                allow = false { contains(input.path, "blocked") }
                "#,
            )]),
            "allow = data.main.allow",
        )
        .unwrap();

        let ok = prepared.eval(&json!({"path": "fine"})).unwrap().unwrap();
        assert_eq!(ok["allow"], json!(true));

        let denied = prepared
            .eval(&json!({"path": "blocked/thing"}))
            .unwrap()
            .unwrap();
        assert_eq!(denied["allow"], json!(false));
    }

    #[test]
    fn two_binding_query_with_wants() {
        let prepared = compile(
            &bundle(&[
                (
                    "main",
                    r#"
                    package main
                    default allow = false
                    allow { input.paths["tree/data/flag"] == "open" }
                    "#,
                ),
                (
                    "wants",
                    r#"
                    package wants
                    paths = ["tree/data/flag"]
                    "#,
                ),
            ]),
            "allow = data.main.allow; wants = data.wants.paths",
        )
        .unwrap();

        let bindings = prepared.eval(&json!({})).unwrap().unwrap();
        assert_eq!(bindings["wants"], json!(["tree/data/flag"]));
        assert_eq!(bindings["allow"], json!(false));

        let second = prepared
            .eval(&json!({"paths": {"tree/data/flag": "open"}}))
            .unwrap()
            .unwrap();
        assert_eq!(second["allow"], json!(true));
    }

    #[test]
    fn undefined_binding_yields_empty_result() {
        let prepared = compile(
            &bundle(&[(
                "main",
                r#"
                package main
                allow { input.never == true }
                "#,
            )]),
            "allow = data.main.allow",
        )
        .unwrap();
        assert!(prepared.eval(&json!({})).unwrap().is_none());
    }

    #[test]
    fn missing_module_is_undefined() {
        let prepared = compile(&bundle(&[]), "allow = data.main.allow").unwrap();
        assert!(prepared.eval(&json!({})).unwrap().is_none());
    }

    #[test]
    fn compile_error_surfaces_module_name() {
        let err = compile(
            &bundle(&[("broken", "package broken\nallow {")]),
            "allow = data.broken.allow",
        )
        .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn has_package_reflects_compiled_modules() {
        let prepared = compile(
            &bundle(&[("wants", "package wants\npaths = []")]),
            "wants = data.wants.paths",
        )
        .unwrap();
        assert!(prepared.has_package("wants"));
        assert!(!prepared.has_package("main"));
    }
}
