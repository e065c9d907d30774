//! End-to-end aggregator scenarios.

use std::sync::{Arc, Mutex};

use k256::ecdsa::SigningKey;
use serde_json::json;

use arbor_aggregator::{Aggregator, AggregatorConfig, AggregatorError};
use arbor_chaintree::{
    process_block, sign_block, AddBlockRequest, Block, ChainTree, Transaction, TransactorRegistry,
};
use arbor_dag::{json_to_ipld, Ipld};
use arbor_identity::Identity;
use arbor_store::{BlockStore, KvBlockStore, MemoryKeyValueStore, Node};
use arbor_types::{CancelToken, Did};

/// A client-side tree builder producing valid ABRs, the way a real wallet
/// would: build locally, sign, ship the nodes.
struct TestClient {
    key: SigningKey,
    did: Did,
    store: Arc<dyn BlockStore>,
    tip: cid::Cid,
    height: Option<u64>,
}

impl TestClient {
    fn new() -> Self {
        let key = SigningKey::random(&mut rand::thread_rng());
        let did =
            Did::from_uncompressed_key(key.verifying_key().to_encoded_point(false).as_bytes())
                .unwrap();
        let store: Arc<dyn BlockStore> =
            Arc::new(KvBlockStore::new(Arc::new(MemoryKeyValueStore::new())));
        let tree = ChainTree::new_empty(&did, Arc::clone(&store)).unwrap();
        let tip = *tree.tip();
        Self {
            key,
            did,
            store,
            tip,
            height: None,
        }
    }

    fn did(&self) -> &Did {
        &self.did
    }

    /// Build (but do not commit) an ABR setting `path` to `value`.
    fn build_set_data(&self, path: &str, value: &Ipld) -> (AddBlockRequest, cid::Cid) {
        let height = self.height.map_or(0, |h| h + 1);
        let block = Block {
            previous_tip: self.height.map(|_| self.tip),
            height,
            transactions: vec![Transaction::set_data(path, value).unwrap()],
        };
        let bwh = sign_block(&block, &self.key).unwrap();

        let tree = ChainTree::from_tip(self.tip, Arc::clone(&self.store)).unwrap();
        let processed = process_block(&tree, &bwh, &TransactorRegistry::standard()).unwrap();

        let mut state: Vec<serde_bytes::ByteBuf> = processed
            .new_nodes
            .iter()
            .map(|n| serde_bytes::ByteBuf::from(n.bytes().to_vec()))
            .collect();
        if self.height.is_none() {
            for node in ChainTree::empty_tree_nodes(&self.did).unwrap() {
                state.push(serde_bytes::ByteBuf::from(node.bytes().to_vec()));
            }
        }

        let abr = AddBlockRequest {
            object_id: self.did.as_str().as_bytes().to_vec(),
            previous_tip: self.tip.to_bytes(),
            height,
            new_tip: processed.new_tip.to_bytes(),
            payload: bwh.to_bytes().unwrap(),
            state,
        };
        (abr, processed.new_tip)
    }

    /// Build an ABR and advance the local view to its new tip.
    fn set_data(&mut self, path: &str, value: &Ipld) -> AddBlockRequest {
        let (abr, new_tip) = self.build_set_data(path, value);
        self.height = Some(self.height.map_or(0, |h| h + 1));
        self.tip = new_tip;
        abr
    }
}

fn aggregator() -> Aggregator {
    Aggregator::new(AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new()))).unwrap()
}

fn segments(path: &str) -> Vec<String> {
    path.split('/').map(str::to_string).collect()
}

fn token() -> CancelToken {
    CancelToken::new()
}

// ---------------------------------------------------------------------------
// Scenario: first write then read
// ---------------------------------------------------------------------------

#[test]
fn first_write_then_read() {
    let agg = aggregator();
    let mut client = TestClient::new();

    let abr = client.set_data("/my/data", &Ipld::String("foo".into()));
    let response = agg.add(&token(), &abr).unwrap();
    assert!(response.is_valid);

    let resolved = agg
        .resolve_with_read_controls(&token(), None, client.did(), &segments("tree/data/my/data"))
        .unwrap();
    assert_eq!(resolved.value, Some(Ipld::String("foo".into())));
    assert!(resolved.remaining_path.is_empty());
    assert!(!resolved.touched_blocks.is_empty());
}

// ---------------------------------------------------------------------------
// Scenario: conflicting writes
// ---------------------------------------------------------------------------

#[test]
fn conflicting_writes_second_fails_with_tip_mismatch() {
    let agg = aggregator();
    let client = TestClient::new();

    let (abr1, _) = client.build_set_data("/path", &Ipld::String("value".into()));
    let (abr2, _) = client.build_set_data("/path", &Ipld::String("differentvalue".into()));

    agg.add(&token(), &abr1).unwrap();
    let err = agg.add(&token(), &abr2).unwrap_err();
    assert!(matches!(err, AggregatorError::PreviousTipMismatch { .. }));
}

// ---------------------------------------------------------------------------
// Invariants: tip index and block store agree with the response
// ---------------------------------------------------------------------------

#[test]
fn successful_add_updates_tip_and_stores_nodes() {
    let agg = aggregator();
    let mut client = TestClient::new();

    let abr = client.set_data("/k", &Ipld::Integer(1));
    let response = agg.add(&token(), &abr).unwrap();
    let new_tip = response.new_tip.unwrap();

    // get_tip returns exactly the committed tip.
    assert_eq!(agg.get_tip(client.did()).unwrap(), Some(new_tip));

    // Everything reachable from the tip resolves without dangling links.
    let latest = agg.get_latest(client.did()).unwrap().unwrap();
    assert_eq!(
        latest.dag().resolve_str("tree/data/k").unwrap().value,
        Some(Ipld::Integer(1))
    );
    assert!(latest.dag().resolve_str("chain/end").unwrap().is_resolved());
}

#[test]
fn sequential_writes_advance_height() {
    let agg = aggregator();
    let mut client = TestClient::new();

    agg.add(&token(), &client.set_data("/a", &Ipld::Integer(1)))
        .unwrap();
    agg.add(&token(), &client.set_data("/b", &Ipld::Integer(2)))
        .unwrap();
    agg.add(&token(), &client.set_data("/c", &Ipld::Integer(3)))
        .unwrap();

    let latest = agg.get_latest(client.did()).unwrap().unwrap();
    assert_eq!(latest.height().unwrap(), Some(2));
    assert_eq!(
        latest.dag().resolve_str("tree/data/a").unwrap().value,
        Some(Ipld::Integer(1))
    );
    assert_eq!(
        latest.dag().resolve_str("tree/data/c").unwrap().value,
        Some(Ipld::Integer(3))
    );
}

#[test]
fn resolving_twice_touches_identical_blocks() {
    let agg = aggregator();
    let mut client = TestClient::new();
    agg.add(&token(), &client.set_data("/x/y", &Ipld::String("v".into())))
        .unwrap();

    let first = agg
        .resolve_with_read_controls(&token(), None, client.did(), &segments("tree/data/x/y"))
        .unwrap();
    let second = agg
        .resolve_with_read_controls(&token(), None, client.did(), &segments("tree/data/x/y"))
        .unwrap();

    assert_eq!(first.value, second.value);
    let cids = |blocks: &[Node]| {
        blocks
            .iter()
            .map(|n| *n.cid())
            .collect::<std::collections::HashSet<_>>()
    };
    assert_eq!(cids(&first.touched_blocks), cids(&second.touched_blocks));
}

#[test]
fn unknown_object_resolves_to_full_remainder() {
    let agg = aggregator();
    let nobody = Did::parse("did:tupelo:0x00000000000000000000000000000000000000ee").unwrap();
    let path = segments("tree/data/x");

    let resolved = agg
        .resolve_with_read_controls(&token(), None, &nobody, &path)
        .unwrap();
    assert_eq!(resolved.value, None);
    assert_eq!(resolved.remaining_path, path);
    assert!(resolved.touched_blocks.is_empty());
}

#[test]
fn path_longer_than_dag_returns_suffix() {
    let agg = aggregator();
    let mut client = TestClient::new();
    agg.add(&token(), &client.set_data("/a", &Ipld::String("leaf".into())))
        .unwrap();

    let resolved = agg
        .resolve_with_read_controls(&token(), None, client.did(), &segments("tree/data/a/b/c"))
        .unwrap();
    assert_eq!(resolved.value, None);
    assert_eq!(resolved.remaining_path, segments("b/c"));
}

// ---------------------------------------------------------------------------
// Update callback
// ---------------------------------------------------------------------------

#[test]
fn update_callback_sees_each_add_in_order() {
    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let config = AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new())).with_update_fn(
        Box::new(move |wrapper| {
            sink.lock().unwrap().push(wrapper.abr.new_tip.clone());
        }),
    );
    let agg = Aggregator::new(config).unwrap();

    let mut client = TestClient::new();
    let r1 = agg
        .add(&token(), &client.set_data("/a", &Ipld::Integer(1)))
        .unwrap();
    let r2 = agg
        .add(&token(), &client.set_data("/b", &Ipld::Integer(2)))
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], r1.new_tip.unwrap().to_bytes());
    assert_eq!(seen[1], r2.new_tip.unwrap().to_bytes());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancelled_token_stops_before_any_state_change() {
    let agg = aggregator();
    let mut client = TestClient::new();
    let abr = client.set_data("/a", &Ipld::Integer(1));

    let cancelled = CancelToken::new();
    cancelled.cancel();
    assert!(matches!(
        agg.add(&cancelled, &abr).unwrap_err(),
        AggregatorError::Cancelled
    ));
    assert_eq!(agg.get_tip(client.did()).unwrap(), None);
}

// ---------------------------------------------------------------------------
// Scenario: global write policy
// ---------------------------------------------------------------------------

fn policies_value(entries: &[(&str, &str)]) -> Ipld {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    json_to_ipld(&serde_json::Value::Object(map))
}

#[test]
fn global_write_policy_blocks_matching_adds() {
    let mut config_client = TestClient::new();
    let config = AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new()))
        .with_config_did(config_client.did().clone());
    let agg = Aggregator::new(config).unwrap();

    let policies = policies_value(&[(
        "main",
        r#"
        package main
        default allow = true

        allow = false {
            contains(input.transactions[_].setDataPayload.path, "in-this-house-we-do-not-use-this")
        }
        "#,
    )]);
    let abr = config_client.set_data(".well-known/policies", &policies);
    assert!(agg.add(&token(), &abr).unwrap().is_valid);

    // A different tree now trips the global policy.
    let mut other = TestClient::new();
    let blocked = other.set_data(
        "in-this-house-we-do-not-use-this",
        &Ipld::String("this should never set".into()),
    );
    let response = agg.add(&token(), &blocked).unwrap();
    assert!(!response.is_valid);
    assert_eq!(agg.get_tip(other.did()).unwrap(), None);

    // Unrelated paths still write fine.
    let mut fine = TestClient::new();
    let allowed = fine.set_data("/ordinary", &Ipld::String("ok".into()));
    assert!(agg.add(&token(), &allowed).unwrap().is_valid);
}

// ---------------------------------------------------------------------------
// Scenario: global read policy
// ---------------------------------------------------------------------------

#[test]
fn global_read_policy_makes_denial_look_like_absence() {
    let mut config_client = TestClient::new();
    let config = AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new()))
        .with_config_did(config_client.did().clone());
    let agg = Aggregator::new(config).unwrap();

    let policies = policies_value(&[(
        "read",
        r#"
        package read
        default allow = true

        allow = false {
            contains(input.path, "badnews")
        }
        "#,
    )]);
    agg.add(&token(), &config_client.set_data(".well-known/policies", &policies))
        .unwrap();

    let mut writer = TestClient::new();
    agg.add(&token(), &writer.set_data("badnews/ok", &Ipld::String("foo".into())))
        .unwrap();

    // Even the writer cannot read it back; the response is shaped exactly
    // like absence.
    let path = segments("tree/data/badnews/ok");
    let denied = agg
        .resolve_with_read_controls(&token(), None, writer.did(), &path)
        .unwrap();
    assert_eq!(denied.value, None);
    assert_eq!(denied.remaining_path, path);
    assert!(denied.touched_blocks.is_empty());

    // Other paths in the same tree remain readable.
    agg.add(&token(), &writer.set_data("goodnews", &Ipld::String("yay".into())))
        .unwrap();
    let fine = agg
        .resolve_with_read_controls(&token(), None, writer.did(), &segments("tree/data/goodnews"))
        .unwrap();
    assert_eq!(fine.value, Some(Ipld::String("yay".into())));
}

// ---------------------------------------------------------------------------
// Scenario: per-tree read policy with identity
// ---------------------------------------------------------------------------

#[test]
fn tree_read_policy_gates_on_identity() {
    let agg = aggregator();
    let mut client = TestClient::new();

    let expected = "did:tupelo:someone";
    let policies = policies_value(&[(
        "read",
        r#"
        package read
        default allow = false

        allow {
            input.identity.sub == "did:tupelo:someone"
        }
        "#,
    )]);
    agg.add(&token(), &client.set_data(".well-known/policies", &policies))
        .unwrap();

    let path = segments("tree/data/.well-known/policies");

    // Anonymous read: absent.
    let denied = agg
        .resolve_with_read_controls(&token(), None, client.did(), &path)
        .unwrap();
    assert_eq!(denied.value, None);
    assert_eq!(denied.remaining_path.len(), 4);

    // Matching identity: present.
    let identity = Identity {
        iss: expected.into(),
        sub: expected.into(),
        aud: String::new(),
        exp: i64::MAX,
        iat: 0,
    };
    let allowed = agg
        .resolve_with_read_controls(&token(), Some(&identity), client.did(), &path)
        .unwrap();
    assert!(allowed.value.is_some());
    assert!(allowed.remaining_path.is_empty());
}

// ---------------------------------------------------------------------------
// Scenario: config-tree hot reload
// ---------------------------------------------------------------------------

#[test]
fn config_tree_update_reinstalls_global_policy() {
    let mut config_client = TestClient::new();
    let config = AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new()))
        .with_config_did(config_client.did().clone());
    let agg = Aggregator::new(config).unwrap();

    // Before any config write, everything is allowed.
    let mut early = TestClient::new();
    assert!(agg
        .add(&token(), &early.set_data("soon-to-be-banned", &Ipld::Integer(1)))
        .unwrap()
        .is_valid);

    // Install a policy banning that path.
    let policies = policies_value(&[(
        "main",
        r#"
        package main
        default allow = true
        allow = false { contains(input.transactions[_].setDataPayload.path, "soon-to-be-banned") }
        "#,
    )]);
    agg.add(&token(), &config_client.set_data(".well-known/policies", &policies))
        .unwrap();

    // The very next matching Add is denied under the new policy.
    let mut late = TestClient::new();
    let response = agg
        .add(&token(), &late.set_data("soon-to-be-banned", &Ipld::Integer(2)))
        .unwrap();
    assert!(!response.is_valid);
}

#[test]
fn aggregator_starts_with_unwritten_config_tree() {
    let ghost = Did::parse("did:tupelo:0x00000000000000000000000000000000000000cd").unwrap();
    let config =
        AggregatorConfig::new(Arc::new(MemoryKeyValueStore::new())).with_config_did(ghost);
    let agg = Aggregator::new(config).unwrap();

    // No global policies installed: ordinary writes pass.
    let mut client = TestClient::new();
    assert!(agg
        .add(&token(), &client.set_data("/x", &Ipld::Integer(1)))
        .unwrap()
        .is_valid);
}

// ---------------------------------------------------------------------------
// Per-tree write policy (wants-free) through the validator plug
// ---------------------------------------------------------------------------

#[test]
fn tree_write_policy_rejects_further_blocks() {
    let agg = aggregator();
    let mut client = TestClient::new();

    // Height 0: install a write policy that forbids touching "frozen".
    let policies = policies_value(&[(
        "main",
        r#"
        package main
        default allow = true
        allow = false { contains(input.transactions[_].setDataPayload.path, "frozen") }
        "#,
    )]);
    agg.add(&token(), &client.set_data(".well-known/policies", &policies))
        .unwrap();

    // Height 1 violating the tree's own policy fails as an invalid block.
    let frozen = client.set_data("frozen/value", &Ipld::Integer(9));
    assert!(matches!(
        agg.add(&token(), &frozen).unwrap_err(),
        AggregatorError::InvalidBlock { .. }
    ));
}
