//! The policy evaluator.
//!
//! Evaluation is substitution-based: an expression evaluates to the list of
//! its possible values (wildcards expand over array elements and object
//! values), a body is satisfied when some combination of expansions makes
//! every statement hold, and `not` succeeds when no expansion does. A step
//! budget bounds CPU for hostile policies.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{Expr, Module, PathSeg, Rule, Stmt};
use crate::error::{PolicyError, PolicyResult};

/// Default evaluation step budget.
pub const DEFAULT_STEP_BUDGET: usize = 100_000;

type Env = BTreeMap<String, Value>;

/// Compiled modules keyed by package path.
#[derive(Clone, Debug, Default)]
pub struct ModuleSet {
    modules: BTreeMap<String, Module>,
}

impl ModuleSet {
    /// Index modules by their declared package.
    pub fn new(modules: Vec<Module>) -> Self {
        let mut map = BTreeMap::new();
        for module in modules {
            map.insert(module.package.clone(), module);
        }
        Self { modules: map }
    }

    /// Look up a module by package path.
    pub fn get(&self, package: &str) -> Option<&Module> {
        self.modules.get(package)
    }

    /// Returns `true` if a package with this path exists.
    pub fn has_package(&self, package: &str) -> bool {
        self.modules.contains_key(package)
    }
}

/// One evaluation pass over a fixed input document.
pub struct Evaluator<'a> {
    modules: &'a ModuleSet,
    input: &'a Value,
    steps: Cell<usize>,
    budget: usize,
    stack: RefCell<Vec<(String, String)>>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator with the given step budget.
    pub fn new(modules: &'a ModuleSet, input: &'a Value, budget: usize) -> Self {
        Self {
            modules,
            input,
            steps: Cell::new(0),
            budget,
            stack: RefCell::new(Vec::new()),
        }
    }

    fn step(&self) -> PolicyResult<()> {
        let used = self.steps.get() + 1;
        if used > self.budget {
            return Err(PolicyError::StepBudgetExceeded { steps: self.budget });
        }
        self.steps.set(used);
        Ok(())
    }

    /// Evaluate `data.<package>.<name>`, `None` meaning *undefined*.
    pub fn eval_rule(&self, package: &str, name: &str) -> PolicyResult<Option<Value>> {
        self.step()?;
        let key = (package.to_string(), name.to_string());
        if self.stack.borrow().contains(&key) {
            return Err(PolicyError::Eval {
                reason: format!("rule data.{package}.{name} is recursive"),
            });
        }
        let Some(module) = self.modules.get(package) else {
            return Ok(None);
        };

        self.stack.borrow_mut().push(key);
        let result = self.eval_rule_clauses(module, name);
        self.stack.borrow_mut().pop();
        result
    }

    fn eval_rule_clauses(&self, module: &Module, name: &str) -> PolicyResult<Option<Value>> {
        for clause in module.clauses(name) {
            if let Some(value) = self.eval_clause(module, clause)? {
                return Ok(Some(value));
            }
        }
        if let Some(default) = module.default_clause(name) {
            let value = default
                .value
                .as_ref()
                .expect("default rules always carry a value");
            let candidates = self.eval_expr(value, &Env::new(), &module.package)?;
            if let Some(v) = candidates.into_iter().next() {
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    fn eval_clause(&self, module: &Module, clause: &Rule) -> PolicyResult<Option<Value>> {
        let mut solutions = Vec::new();
        self.solve(&clause.body, Env::new(), &module.package, &mut solutions, 1)?;
        let Some(env) = solutions.into_iter().next() else {
            return Ok(None);
        };
        match &clause.value {
            Some(expr) => {
                let candidates = self.eval_expr(expr, &env, &module.package)?;
                Ok(candidates.into_iter().next())
            }
            None => Ok(Some(Value::Bool(true))),
        }
    }

    /// Enumerate environments that satisfy a body, up to `limit`.
    fn solve(
        &self,
        stmts: &[Stmt],
        env: Env,
        package: &str,
        out: &mut Vec<Env>,
        limit: usize,
    ) -> PolicyResult<()> {
        self.step()?;
        if out.len() >= limit {
            return Ok(());
        }
        let Some((stmt, rest)) = stmts.split_first() else {
            out.push(env);
            return Ok(());
        };

        match stmt {
            Stmt::Bind(name, expr) => {
                for value in self.eval_expr(expr, &env, package)? {
                    let mut next = env.clone();
                    next.insert(name.clone(), value);
                    self.solve(rest, next, package, out, limit)?;
                    if out.len() >= limit {
                        return Ok(());
                    }
                }
            }
            Stmt::Eq(a, b) => {
                if self.combos_satisfy(a, b, &env, package, |x, y| x == y)? {
                    self.solve(rest, env, package, out, limit)?;
                }
            }
            Stmt::Neq(a, b) => {
                if self.combos_satisfy(a, b, &env, package, |x, y| x != y)? {
                    self.solve(rest, env, package, out, limit)?;
                }
            }
            Stmt::Not(expr) => {
                let candidates = self.eval_expr(expr, &env, package)?;
                if candidates.iter().all(|v| !truthy(v)) {
                    self.solve(rest, env, package, out, limit)?;
                }
            }
            Stmt::Expr(expr) => {
                let candidates = self.eval_expr(expr, &env, package)?;
                if candidates.iter().any(truthy) {
                    self.solve(rest, env, package, out, limit)?;
                }
            }
        }
        Ok(())
    }

    fn combos_satisfy(
        &self,
        a: &Expr,
        b: &Expr,
        env: &Env,
        package: &str,
        predicate: impl Fn(&Value, &Value) -> bool,
    ) -> PolicyResult<bool> {
        let left = self.eval_expr(a, env, package)?;
        if left.is_empty() {
            return Ok(false);
        }
        let right = self.eval_expr(b, env, package)?;
        for va in &left {
            for vb in &right {
                self.step()?;
                if predicate(va, vb) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// All possible values of an expression. Empty means *undefined*.
    pub fn eval_expr(&self, expr: &Expr, env: &Env, package: &str) -> PolicyResult<Vec<Value>> {
        self.step()?;
        match expr {
            Expr::Str(s) => Ok(vec![Value::String(s.clone())]),
            Expr::Int(i) => Ok(vec![Value::Number((*i).into())]),
            Expr::Float(f) => Ok(serde_json::Number::from_f64(*f)
                .map(|n| vec![Value::Number(n)])
                .unwrap_or_default()),
            Expr::Bool(b) => Ok(vec![Value::Bool(*b)]),
            Expr::Null => Ok(vec![Value::Null]),

            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let candidates = self.eval_expr(item, env, package)?;
                    match candidates.into_iter().next() {
                        Some(v) => values.push(v),
                        None => return Ok(Vec::new()), // undefined element
                    }
                }
                Ok(vec![Value::Array(values)])
            }

            Expr::Comprehension { head, body } => {
                let mut solutions = Vec::new();
                self.solve(body, env.clone(), package, &mut solutions, usize::MAX)?;
                let mut values = Vec::new();
                for solution in solutions {
                    let mut candidates = self.eval_expr(head, &solution, package)?;
                    values.extend(candidates.drain(..).next());
                }
                Ok(vec![Value::Array(values)])
            }

            Expr::Call { name, args } => self.eval_call(name, args, env, package),

            Expr::Ref { root, path } => {
                let roots: Vec<Value> = if let Some(bound) = env.get(root) {
                    vec![bound.clone()]
                } else if root == "input" {
                    vec![self.input.clone()]
                } else if root == "data" {
                    return self.eval_data_ref(path);
                } else {
                    // A bare name references a rule in the same package.
                    match self.eval_rule(package, root)? {
                        Some(value) => vec![value],
                        None => Vec::new(),
                    }
                };
                self.walk_path(roots, path)
            }
        }
    }

    /// Resolve `data.<package...>.<rule>[...]` with greedy package match.
    fn eval_data_ref(&self, path: &[PathSeg]) -> PolicyResult<Vec<Value>> {
        let mut keys = Vec::new();
        for seg in path {
            match seg {
                PathSeg::Key(k) => keys.push(k.clone()),
                _ => break,
            }
        }
        // Longest package prefix wins so dotted packages resolve.
        for split in (1..keys.len()).rev() {
            let package = keys[..split].join(".");
            if self.modules.has_package(&package) {
                let rule = &keys[split];
                let Some(value) = self.eval_rule(&package, rule)? else {
                    return Ok(Vec::new());
                };
                return self.walk_path(vec![value], &path[split + 1..]);
            }
        }
        Ok(Vec::new())
    }

    fn walk_path(&self, roots: Vec<Value>, path: &[PathSeg]) -> PolicyResult<Vec<Value>> {
        let mut current = roots;
        for seg in path {
            let mut next = Vec::new();
            for value in &current {
                self.step()?;
                match seg {
                    PathSeg::Key(key) => match value {
                        Value::Object(map) => next.extend(map.get(key).cloned()),
                        Value::Array(items) => {
                            // Numeric string keys index arrays.
                            if let Ok(i) = key.parse::<usize>() {
                                next.extend(items.get(i).cloned());
                            }
                        }
                        _ => {}
                    },
                    PathSeg::Index(i) => {
                        if let Value::Array(items) = value {
                            if *i >= 0 {
                                next.extend(items.get(*i as usize).cloned());
                            }
                        }
                    }
                    PathSeg::Wildcard => match value {
                        Value::Array(items) => next.extend(items.iter().cloned()),
                        Value::Object(map) => next.extend(map.values().cloned()),
                        _ => {}
                    },
                }
            }
            current = next;
            if current.is_empty() {
                return Ok(current);
            }
        }
        Ok(current)
    }

    fn eval_call(
        &self,
        name: &str,
        args: &[Expr],
        env: &Env,
        package: &str,
    ) -> PolicyResult<Vec<Value>> {
        let mut candidates = Vec::with_capacity(args.len());
        for arg in args {
            candidates.push(self.eval_expr(arg, env, package)?);
        }

        let mut results = Vec::new();
        let mut combo = Vec::with_capacity(args.len());
        self.call_combos(name, &candidates, &mut combo, &mut results)?;
        Ok(results)
    }

    fn call_combos(
        &self,
        name: &str,
        candidates: &[Vec<Value>],
        combo: &mut Vec<Value>,
        results: &mut Vec<Value>,
    ) -> PolicyResult<()> {
        if combo.len() == candidates.len() {
            self.step()?;
            if let Some(result) = builtin(name, combo)? {
                results.push(result);
            }
            return Ok(());
        }
        for value in &candidates[combo.len()] {
            combo.push(value.clone());
            self.call_combos(name, candidates, combo, results)?;
            combo.pop();
        }
        Ok(())
    }
}

/// Truthiness: `false` and `null` fail a statement, everything else holds.
fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

/// Built-in functions. Type mismatches yield *undefined*, not errors.
fn builtin(name: &str, args: &[Value]) -> PolicyResult<Option<Value>> {
    match (name, args) {
        ("contains", [Value::String(haystack), Value::String(needle)]) => {
            Ok(Some(Value::Bool(haystack.contains(needle.as_str()))))
        }
        ("startswith", [Value::String(s), Value::String(prefix)]) => {
            Ok(Some(Value::Bool(s.starts_with(prefix.as_str()))))
        }
        ("endswith", [Value::String(s), Value::String(suffix)]) => {
            Ok(Some(Value::Bool(s.ends_with(suffix.as_str()))))
        }
        ("count", [value]) => {
            let n = match value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                _ => return Ok(None),
            };
            Ok(Some(Value::Number(n.into())))
        }
        ("contains" | "startswith" | "endswith", _) => Ok(None),
        _ => Err(PolicyError::Eval {
            reason: format!("unknown builtin {name}/{}", args.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use serde_json::json;

    fn modules(sources: &[(&str, &str)]) -> ModuleSet {
        ModuleSet::new(
            sources
                .iter()
                .map(|(name, src)| parse_module(name, src).unwrap())
                .collect(),
        )
    }

    fn eval_allow(set: &ModuleSet, package: &str, input: Value) -> Option<Value> {
        let evaluator = Evaluator::new(set, &input, DEFAULT_STEP_BUDGET);
        evaluator.eval_rule(package, "allow").unwrap()
    }

    #[test]
    fn default_rule_applies_when_no_clause_fires() {
        let set = modules(&[(
            "main",
            r#"
            package main
            default allow = true
            allow = false { input.height == 99 }
            "#,
        )]);
        assert_eq!(
            eval_allow(&set, "main", json!({"height": 0})),
            Some(Value::Bool(true))
        );
        assert_eq!(
            eval_allow(&set, "main", json!({"height": 99})),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn wildcard_expands_over_transactions() {
        let set = modules(&[(
            "main",
            r#"
            package main
            default allow = true
            allow = false {
                contains(input.transactions[_].setDataPayload.path, "forbidden")
            }
            "#,
        )]);
        let blocked = json!({"transactions": [
            {"setDataPayload": {"path": "fine"}},
            {"setDataPayload": {"path": "very/forbidden/path"}},
        ]});
        let clean = json!({"transactions": [{"setDataPayload": {"path": "fine"}}]});
        assert_eq!(eval_allow(&set, "main", blocked), Some(Value::Bool(false)));
        assert_eq!(eval_allow(&set, "main", clean), Some(Value::Bool(true)));
    }

    #[test]
    fn negation_of_helper_rule() {
        let set = modules(&[(
            "main",
            r#"
            package main
            default allow = false
            modifies_policy {
                contains(input.transactions[_].setDataPayload.path, ".well-known/policies")
            }
            allow {
                not modifies_policy
            }
            "#,
        )]);
        let touching = json!({"transactions": [{"setDataPayload": {"path": ".well-known/policies"}}]});
        let benign = json!({"transactions": [{"setDataPayload": {"path": "data/x"}}]});
        assert_eq!(eval_allow(&set, "main", touching), Some(Value::Bool(false)));
        assert_eq!(eval_allow(&set, "main", benign), Some(Value::Bool(true)));
    }

    #[test]
    fn equality_against_identity() {
        let set = modules(&[(
            "read",
            r#"
            package read
            default allow = false
            allow { input.identity.sub == "did:tupelo:someone" }
            "#,
        )]);
        assert_eq!(
            eval_allow(&set, "read", json!({"identity": {"sub": "did:tupelo:someone"}})),
            Some(Value::Bool(true))
        );
        assert_eq!(
            eval_allow(&set, "read", json!({"identity": null})),
            Some(Value::Bool(false))
        );
        assert_eq!(
            eval_allow(&set, "read", json!({})),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn undefined_without_default() {
        let set = modules(&[(
            "main",
            r#"
            package main
            allow { input.magic == true }
            "#,
        )]);
        assert_eq!(eval_allow(&set, "main", json!({})), None);
        assert_eq!(
            eval_allow(&set, "main", json!({"magic": true})),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn constant_rules_and_cross_module_data_refs() {
        let set = modules(&[
            (
                "wants",
                r#"
                package wants
                paths = ["tree/data/friends"]
                "#,
            ),
            (
                "main",
                r#"
                package main
                default allow = false
                allow { count(data.wants.paths) == 1 }
                "#,
            ),
        ]);
        assert_eq!(eval_allow(&set, "main", json!({})), Some(Value::Bool(true)));
    }

    #[test]
    fn comprehension_collects_bindings() {
        let set = modules(&[(
            "m",
            r#"
            package m
            doubled = [p | p := input.paths[_]]
            "#,
        )]);
        let input = json!({"paths": ["a", "b"]});
        let evaluator = Evaluator::new(&set, &input, DEFAULT_STEP_BUDGET);
        assert_eq!(
            evaluator.eval_rule("m", "doubled").unwrap(),
            Some(json!(["a", "b"]))
        );
    }

    #[test]
    fn dotted_packages_resolve() {
        let set = modules(&[(
            "nopolicychange",
            r#"
            package tupelo.nopolicychange
            default allow = true
            "#,
        )]);
        let input = json!({});
        let evaluator = Evaluator::new(&set, &input, DEFAULT_STEP_BUDGET);
        assert_eq!(
            evaluator
                .eval_rule("tupelo.nopolicychange", "allow")
                .unwrap(),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn recursion_is_an_error() {
        let set = modules(&[(
            "m",
            r#"
            package m
            a { b }
            b { a }
            "#,
        )]);
        let input = json!({});
        let evaluator = Evaluator::new(&set, &input, DEFAULT_STEP_BUDGET);
        assert!(matches!(
            evaluator.eval_rule("m", "a"),
            Err(PolicyError::Eval { .. })
        ));
    }

    #[test]
    fn step_budget_is_enforced() {
        let set = modules(&[(
            "m",
            r#"
            package m
            allow { input.xs[_] == input.ys[_] }
            "#,
        )]);
        let input = json!({
            "xs": (0..200).collect::<Vec<_>>(),
            "ys": (500..700).collect::<Vec<_>>(),
        });
        let evaluator = Evaluator::new(&set, &input, 50);
        assert!(matches!(
            evaluator.eval_rule("m", "allow"),
            Err(PolicyError::StepBudgetExceeded { .. })
        ));
    }

    #[test]
    fn neq_and_startswith() {
        let set = modules(&[(
            "m",
            r#"
            package m
            default allow = false
            allow {
                input.method != "DELETE"
                startswith(input.path, "tree/")
            }
            "#,
        )]);
        assert_eq!(
            eval_allow(&set, "m", json!({"method": "GET", "path": "tree/data/x"})),
            Some(Value::Bool(true))
        );
        assert_eq!(
            eval_allow(&set, "m", json!({"method": "DELETE", "path": "tree/data/x"})),
            Some(Value::Bool(false))
        );
        assert_eq!(
            eval_allow(&set, "m", json!({"method": "GET", "path": "chain/end"})),
            Some(Value::Bool(false))
        );
    }
}
