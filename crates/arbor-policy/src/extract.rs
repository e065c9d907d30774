//! Policy extraction from ChainTrees and the two-phase wants protocol.
//!
//! Policies live inside the tree they govern, at
//! `tree/data/.well-known/policies`, as a map of module name → rule source.
//! Absence at any level defaults to *allow*: no bundle, or a bundle without
//! the relevant entry module, means the tree does not enforce that
//! direction.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use arbor_dag::{ipld_to_json, Dag, DagGetter, GraftedWalker, Ipld};

use crate::engine::{compile, PreparedQuery};
use crate::error::{PolicyError, PolicyResult};

/// Path of the policy bundle inside a tree.
pub const POLICY_PATH: [&str; 4] = ["tree", "data", ".well-known", "policies"];

/// Entry module for write policies.
pub const WRITE_MAIN_MODULE: &str = "main";
/// Wants module for write policies.
pub const WRITE_WANTS_MODULE: &str = "wants";
/// Entry module for read policies.
pub const READ_MAIN_MODULE: &str = "read";
/// Wants module for read policies.
pub const READ_WANTS_MODULE: &str = "readWants";

/// A tree's compiled policy for one direction (write or read).
#[derive(Debug)]
pub struct TreePolicy {
    query: PreparedQuery,
    has_wants: bool,
}

impl TreePolicy {
    /// Returns `true` if this policy declares a wants module.
    pub fn has_wants(&self) -> bool {
        self.has_wants
    }
}

/// Extract and compile the policy for one direction from a tree.
///
/// `main_module` and `wants_module` name the entry and wants modules
/// (`main`/`wants` for writes, `read`/`readWants` for reads). Returns
/// `Ok(None)` when the tree has no enforcing policy for this direction.
pub fn policy_from_tree(
    dag: &Dag,
    main_module: &str,
    wants_module: &str,
) -> PolicyResult<Option<TreePolicy>> {
    let path: Vec<String> = POLICY_PATH.iter().map(|s| s.to_string()).collect();
    let res = dag.resolve(&path)?;
    if !res.is_resolved() {
        return Ok(None);
    }

    let bundle = match res.value {
        Some(value) => bundle_from_ipld(value)?,
        None => return Ok(None),
    };
    if !bundle.contains_key(main_module) {
        // No entry module for this direction: the tree does not enforce it.
        return Ok(None);
    }

    let has_wants = bundle.contains_key(wants_module);
    let mut query = format!("allow = data.{main_module}.allow");
    if has_wants {
        query.push_str(&format!("; wants = data.{wants_module}.paths"));
    }

    debug!(modules = bundle.len(), has_wants, %query, "compiling tree policy");
    let prepared = compile(&bundle, &query)?;
    Ok(Some(TreePolicy {
        query: prepared,
        has_wants,
    }))
}

fn bundle_from_ipld(value: Ipld) -> PolicyResult<BTreeMap<String, String>> {
    let json = ipld_to_json(&value);
    let Value::Object(map) = json else {
        return Err(PolicyError::MalformedBundle {
            reason: format!("expected a module map, found {json}"),
        });
    };
    let mut bundle = BTreeMap::new();
    for (name, source) in map {
        let Value::String(source) = source else {
            return Err(PolicyError::MalformedBundle {
                reason: format!("module {name} is not a source string"),
            });
        };
        bundle.insert(name, source);
    }
    Ok(bundle)
}

/// Evaluate a tree policy with the two-phase wants protocol.
///
/// Phase one evaluates the prepared query. If the policy declared wants,
/// each wanted path is resolved through the grafted walker (DID-prefixed
/// paths resolve in foreign trees), the results land under `input.paths`,
/// and the query is evaluated again; the second `allow` decides. An
/// undefined result set denies.
pub fn evaluate_with_wants(
    policy: &TreePolicy,
    dag: &Dag,
    getter: &dyn DagGetter,
    input: &Value,
) -> PolicyResult<bool> {
    let Some(bindings) = policy.query.eval(input)? else {
        debug!("policy result undefined, denying");
        return Ok(false);
    };

    if !policy.has_wants {
        return allow_of(&bindings);
    }

    let Some(Value::Array(wants)) = bindings.get("wants") else {
        return Err(PolicyError::Input {
            reason: "wants binding is not a list".into(),
        });
    };

    let walker = GraftedWalker::new(getter);
    let mut resolved = serde_json::Map::new();
    for want in wants {
        let Value::String(path) = want else {
            return Err(PolicyError::Input {
                reason: format!("wants entry is not a string: {want}"),
            });
        };
        // A failing resolution is fatal for the decision; it bubbles rather
        // than silently denying.
        let res = walker.resolve_str(dag, path).map_err(|e| {
            warn!(%path, error = %e, "wants path failed to resolve");
            e
        })?;
        let value = res.value.map(|v| ipld_to_json(&v)).unwrap_or(Value::Null);
        resolved.insert(path.clone(), value);
    }

    let mut second_input = input.clone();
    match &mut second_input {
        Value::Object(map) => {
            map.insert("paths".to_string(), Value::Object(resolved));
        }
        _ => {
            return Err(PolicyError::Input {
                reason: "policy input must be an object".into(),
            })
        }
    }

    let Some(second) = policy.query.eval(&second_input)? else {
        debug!("second-phase policy result undefined, denying");
        return Ok(false);
    };
    allow_of(&second)
}

fn allow_of(bindings: &crate::engine::Bindings) -> PolicyResult<bool> {
    match bindings.get("allow") {
        Some(Value::Bool(b)) => Ok(*b),
        other => Err(PolicyError::Eval {
            reason: format!("allow binding is not a boolean: {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    use cid::Cid;
    use serde_json::json;

    use arbor_dag::{DagResult, json_to_ipld};
    use arbor_store::{BlockStore, KvBlockStore, MemoryKeyValueStore, Node};
    use arbor_types::Did;

    struct MapGetter {
        store: Arc<dyn BlockStore>,
        tips: RwLock<HashMap<String, Cid>>,
    }

    impl MapGetter {
        fn new() -> Self {
            Self {
                store: Arc::new(KvBlockStore::new(Arc::new(MemoryKeyValueStore::new()))),
                tips: RwLock::new(HashMap::new()),
            }
        }

        fn install(&self, did: &Did, entries: &[(&str, Value)]) -> Dag {
            let root = Node::from_ipld(&Ipld::Map(Default::default())).unwrap();
            self.store.put(&root).unwrap();
            let mut dag = Dag::new(*root.cid(), Arc::clone(&self.store));
            for (path, value) in entries {
                let segments: Vec<String> = path.split('/').map(str::to_string).collect();
                let (tip, nodes) = dag.set_at(&segments, json_to_ipld(value)).unwrap();
                self.store.put_many(&nodes).unwrap();
                dag = Dag::new(tip, Arc::clone(&self.store));
            }
            self.tips
                .write()
                .unwrap()
                .insert(did.as_str().to_string(), *dag.tip());
            dag
        }
    }

    impl DagGetter for MapGetter {
        fn get_tip(&self, did: &Did) -> DagResult<Option<Cid>> {
            Ok(self.tips.read().unwrap().get(did.as_str()).copied())
        }

        fn get_latest(&self, did: &Did) -> DagResult<Option<Dag>> {
            Ok(self
                .get_tip(did)?
                .map(|tip| Dag::new(tip, Arc::clone(&self.store))))
        }
    }

    fn did(n: u8) -> Did {
        Did::parse(format!("did:tupelo:0x{:040x}", u128::from(n))).unwrap()
    }

    fn policy_path() -> String {
        POLICY_PATH.join("/")
    }

    #[test]
    fn tree_without_policies_is_unenforced() {
        let getter = MapGetter::new();
        let dag = getter.install(&did(1), &[("tree/data/x", json!("y"))]);
        assert!(policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn bundle_without_entry_module_is_unenforced() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({"main": "package main\ndefault allow = true"}),
            )],
        );
        // Write policy exists, read policy does not.
        assert!(policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .is_some());
        assert!(policy_from_tree(&dag, READ_MAIN_MODULE, READ_WANTS_MODULE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn non_string_module_source_is_malformed() {
        let getter = MapGetter::new();
        let dag = getter.install(&did(1), &[(&policy_path(), json!({"main": 42}))]);
        assert!(matches!(
            policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE).unwrap_err(),
            PolicyError::MalformedBundle { .. }
        ));
    }

    #[test]
    fn broken_module_fails_compilation() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(&policy_path(), json!({"main": "package main\nallow {"}))],
        );
        assert!(matches!(
            policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE).unwrap_err(),
            PolicyError::Compile { .. }
        ));
    }

    #[test]
    fn single_phase_policy_decides() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({"main": r#"
                    package main
                    default allow = true
                    allow = false { contains(input.path, "badnews") }
                "#}),
            )],
        );
        let policy = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .unwrap();
        assert!(!policy.has_wants());

        let allowed =
            evaluate_with_wants(&policy, &dag, &getter, &json!({"path": "fine"})).unwrap();
        assert!(allowed);
        let denied =
            evaluate_with_wants(&policy, &dag, &getter, &json!({"path": "badnews/x"})).unwrap();
        assert!(!denied);
    }

    #[test]
    fn wants_protocol_feeds_resolved_paths_back() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[
                ("tree/data/flag", json!("open")),
                (
                    &policy_path(),
                    json!({
                        "main": r#"
                            package main
                            default allow = false
                            allow { input.paths["tree/data/flag"] == "open" }
                        "#,
                        "wants": r#"
                            package wants
                            paths = ["tree/data/flag"]
                        "#,
                    }),
                ),
            ],
        );
        let policy = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .unwrap();
        assert!(policy.has_wants());

        let allowed = evaluate_with_wants(&policy, &dag, &getter, &json!({})).unwrap();
        assert!(allowed);
    }

    #[test]
    fn wants_resolves_foreign_trees() {
        let getter = MapGetter::new();
        getter.install(&did(2), &[("tree/data/level", json!("gold"))]);
        let foreign_path = format!("{}/tree/data/level", did(2));
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({
                    "main": format!(r#"
                        package main
                        default allow = false
                        allow {{ input.paths["{foreign_path}"] == "gold" }}
                    "#),
                    "wants": format!(r#"
                        package wants
                        paths = ["{foreign_path}"]
                    "#),
                }),
            )],
        );
        let policy = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .unwrap();
        let allowed = evaluate_with_wants(&policy, &dag, &getter, &json!({})).unwrap();
        assert!(allowed);
    }

    #[test]
    fn unresolvable_want_leaves_null_not_denial() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({
                    "main": r#"
                        package main
                        default allow = false
                        allow { input.paths["tree/data/missing"] == null }
                    "#,
                    "wants": r#"
                        package wants
                        paths = ["tree/data/missing"]
                    "#,
                }),
            )],
        );
        let policy = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .unwrap();
        // The missing path resolves to null (absence), and the policy can
        // reason about that explicitly.
        let allowed = evaluate_with_wants(&policy, &dag, &getter, &json!({})).unwrap();
        assert!(allowed);
    }

    #[test]
    fn non_string_wants_entry_is_an_input_error() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({
                    "main": "package main\ndefault allow = true",
                    "wants": "package wants\npaths = [1, 2]",
                }),
            )],
        );
        let policy = policy_from_tree(&dag, WRITE_MAIN_MODULE, WRITE_WANTS_MODULE)
            .unwrap()
            .unwrap();
        assert!(matches!(
            evaluate_with_wants(&policy, &dag, &getter, &json!({})).unwrap_err(),
            PolicyError::Input { .. }
        ));
    }

    #[test]
    fn read_modules_compile_with_read_query() {
        let getter = MapGetter::new();
        let dag = getter.install(
            &did(1),
            &[(
                &policy_path(),
                json!({"read": r#"
                    package read
                    default allow = false
                    allow { input.identity.sub == "did:tupelo:someone" }
                "#}),
            )],
        );
        let policy = policy_from_tree(&dag, READ_MAIN_MODULE, READ_WANTS_MODULE)
            .unwrap()
            .unwrap();

        let denied = evaluate_with_wants(
            &policy,
            &dag,
            &getter,
            &json!({"method": "GET", "path": "tree/data/x", "identity": null}),
        )
        .unwrap();
        assert!(!denied);

        let allowed = evaluate_with_wants(
            &policy,
            &dag,
            &getter,
            &json!({"method": "GET", "path": "tree/data/x",
                    "identity": {"sub": "did:tupelo:someone"}}),
        )
        .unwrap();
        assert!(allowed);
    }
}
