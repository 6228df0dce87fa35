//! Property tests: diff idempotence, set semantics, symmetry, matcher
//! partition completeness and verdict monotonicity.

use policydrift_kernel::{
    ChangeOperation, ComparisonSummary, MatchingOptions, NormalizationTables, PolicyDocument,
    PolicyTree, ValueNormalizer, Verdict, diff, match_policies,
};
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn arb_known_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("state"),
        Just("displayName"),
        Just("conditions"),
        Just("users"),
        Just("clientAppTypes"),
        Just("grantControls"),
        Just("builtInControls"),
        Just("operator"),
        Just("excludeUsers"),
    ]
    .prop_map(str::to_string)
}

/// Policy field names, including ones built from the digest encoding's
/// own delimiter bytes and fully arbitrary text.
fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => arb_known_key(),
        2 => "[a-ck-nsv:{}\\[\\]\n0-9]{0,6}",
        1 => any::<String>(),
    ]
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (0i64..8).prop_map(|n| json!(n)),
        prop_oneof![
            Just("mfa"),
            Just("block"),
            Just("enabled"),
            Just("disabled"),
            Just("browser"),
            Just("All"),
            Just("unknown"),
        ]
        .prop_map(|s| json!(s)),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => arb_scalar(),
        2 => prop::collection::vec(arb_scalar(), 0..5).prop_map(Value::Array),
    ]
}

fn arb_object(depth: u32) -> BoxedStrategy<Value> {
    let value = if depth == 0 {
        arb_leaf().boxed()
    } else {
        prop_oneof![3 => arb_leaf(), 1 => arb_object(depth - 1)].boxed()
    };
    prop::collection::vec((arb_key(), value), 0..6)
        .prop_map(|fields| {
            // Names that fold to the same key would make the body malformed.
            let mut seen = BTreeSet::new();
            let object: Map<String, Value> = fields
                .into_iter()
                .filter(|(key, _)| seen.insert(key.to_ascii_lowercase()))
                .collect();
            Value::Object(object)
        })
        .boxed()
}

fn normalized(body: &Value, tables: &NormalizationTables) -> PolicyTree {
    let tree = PolicyTree::from_document(&PolicyDocument::new("id", "p", body.clone()))
        .expect("generated bodies are well-formed");
    ValueNormalizer::new(tables).normalize_tree(&tree).0
}

fn reverse_arrays(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), reverse_arrays(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn count(diffs: &[policydrift_kernel::Difference], operation: ChangeOperation) -> usize {
    diffs.iter().filter(|d| d.operation == operation).count()
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// diff(T, T) is always empty.
    #[test]
    fn diff_is_idempotent(body in arb_object(2)) {
        let tables = NormalizationTables::builtin().expect("builtin tables");
        let tree = normalized(&body, &tables);
        prop_assert!(diff(&tree, &tree).is_empty());
    }

    /// List order never produces a difference.
    #[test]
    fn list_order_is_irrelevant(body in arb_object(2)) {
        let tables = NormalizationTables::builtin().expect("builtin tables");
        let tree = normalized(&body, &tables);
        let reversed = normalized(&reverse_arrays(&body), &tables);
        prop_assert!(diff(&tree, &reversed).is_empty());
    }

    /// Repeated diffs of the same inputs agree exactly.
    #[test]
    fn diff_is_deterministic(a in arb_object(2), b in arb_object(2)) {
        let tables = NormalizationTables::builtin().expect("builtin tables");
        let (live, reference) = (normalized(&a, &tables), normalized(&b, &tables));
        prop_assert_eq!(diff(&live, &reference), diff(&live, &reference));
    }

    /// Swapping sides swaps adds and removes.
    #[test]
    fn diff_is_antisymmetric(a in arb_object(2), b in arb_object(2)) {
        let tables = NormalizationTables::builtin().expect("builtin tables");
        let (x, y) = (normalized(&a, &tables), normalized(&b, &tables));
        let forward = diff(&x, &y);
        let backward = diff(&y, &x);
        prop_assert_eq!(count(&forward, ChangeOperation::Add), count(&backward, ChangeOperation::Remove));
        prop_assert_eq!(count(&forward, ChangeOperation::Remove), count(&backward, ChangeOperation::Add));
        prop_assert_eq!(count(&forward, ChangeOperation::Modify), count(&backward, ChangeOperation::Modify));
    }

    /// Equal content digests coincide with an empty diff.
    #[test]
    fn digest_agrees_with_diff(a in arb_object(2), b in arb_object(2)) {
        let tables = NormalizationTables::builtin().expect("builtin tables");
        let (x, y) = (normalized(&a, &tables), normalized(&b, &tables));
        prop_assert_eq!(x.digest() == y.digest(), diff(&x, &y).is_empty());
    }

    /// Every distinct identity lands in exactly one bucket.
    #[test]
    fn matching_partitions_every_identity(
        live_names in prop::collection::btree_set("[a-f]{1,2}", 0..8),
        reference_names in prop::collection::btree_set("[a-f]{1,2}", 0..8),
    ) {
        let live: Vec<PolicyDocument> = live_names
            .iter()
            .rev()
            .map(|n| PolicyDocument::new(format!("l-{n}"), n.clone(), json!({})))
            .collect();
        let reference: Vec<PolicyDocument> = reference_names
            .iter()
            .map(|n| PolicyDocument::new(format!("r-{n}"), n.clone(), json!({})))
            .collect();

        let outcome = match_policies(&live, &reference, &MatchingOptions::default())
            .expect("distinct names never collide");
        let union: BTreeSet<&String> = live_names.iter().chain(reference_names.iter()).collect();
        prop_assert_eq!(outcome.identity_count(), union.len());
        prop_assert_eq!(outcome.pairs.len(), live_names.intersection(&reference_names).count());
    }

    /// A critical change always blocks, whatever else the run found.
    #[test]
    fn critical_changes_always_block(
        critical in 1usize..10,
        non_critical in 0usize..50,
        differing in 1usize..20,
        failed in 0usize..3,
        max in prop::option::of(0usize..30),
    ) {
        let summary = ComparisonSummary {
            total: differing + failed,
            different: differing,
            failed,
            differing_policies: differing,
            critical_changes: critical,
            non_critical_changes: non_critical,
            ..ComparisonSummary::default()
        };
        prop_assert_eq!(Verdict::derive(&summary, max), Verdict::Blocking);
        prop_assert_eq!(Verdict::derive(&summary, max).exit_code(), 2);
    }
}
