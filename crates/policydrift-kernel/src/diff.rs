//! Structural diff of two normalized policy trees.
//!
//! The live tree is the subject and the reference tree is the baseline:
//! `add` means "present in live, absent from the baseline", `remove` the
//! reverse, `modify` a value (or node shape) that differs on both sides.
//!
//! Both trees are walked in lock-step over the union of field names,
//! in lexicographic order of the folded names, so output order never
//! depends on source ordering. A subtree present on one side only is
//! reported once at its root. Vacant nodes (null, `[]`, hollow maps)
//! are treated as absent.

use crate::tree::{PolicyMap, PolicyNode, PolicyTree, Scalar, join_path, set_to_json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// What happened at a path, live relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Add,
    Remove,
    Modify,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Modify => write!(f, "modify"),
        }
    }
}

/// An unclassified change emitted by [`diff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    /// Dot path of the changed field, in the baseline's spelling when the
    /// field exists there.
    pub path: String,
    pub operation: ChangeOperation,
    /// Reference-side value.
    pub old_value: Option<Value>,
    /// Live-side value.
    pub new_value: Option<Value>,
    /// Set members added or removed; empty for non-set changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Value>,
}

impl Difference {
    fn added(path: String, live: &PolicyNode) -> Self {
        Self {
            path,
            operation: ChangeOperation::Add,
            old_value: None,
            new_value: Some(live.to_json()),
            elements: Vec::new(),
        }
    }

    fn removed(path: String, reference: &PolicyNode) -> Self {
        Self {
            path,
            operation: ChangeOperation::Remove,
            old_value: Some(reference.to_json()),
            new_value: None,
            elements: Vec::new(),
        }
    }

    fn modified(path: String, live: &PolicyNode, reference: &PolicyNode) -> Self {
        Self {
            path,
            operation: ChangeOperation::Modify,
            old_value: Some(reference.to_json()),
            new_value: Some(live.to_json()),
            elements: Vec::new(),
        }
    }
}

/// Diff a live tree against a reference tree.
///
/// Both trees are expected to be normalized already. `diff(t, t)` is empty
/// for every tree `t`.
pub fn diff(live: &PolicyTree, reference: &PolicyTree) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_maps("", live.root(), reference.root(), &mut out);
    out
}

fn diff_maps(prefix: &str, live: &PolicyMap, reference: &PolicyMap, out: &mut Vec<Difference>) {
    let keys: BTreeSet<&str> = live.keys().chain(reference.keys()).collect();
    for key in keys {
        let live_field = live.field(key);
        let reference_field = reference.field(key);
        let Some(name) = reference_field.or(live_field).map(|field| field.name.as_str()) else {
            continue;
        };
        let path = join_path(prefix, name);
        diff_nodes(
            path,
            live_field.map(|field| &field.node),
            reference_field.map(|field| &field.node),
            out,
        );
    }
}

fn diff_nodes(
    path: String,
    live: Option<&PolicyNode>,
    reference: Option<&PolicyNode>,
    out: &mut Vec<Difference>,
) {
    let live = live.filter(|node| !node.is_vacant());
    let reference = reference.filter(|node| !node.is_vacant());

    match (live, reference) {
        (None, None) => {}
        (Some(l), None) => out.push(Difference::added(path, l)),
        (None, Some(r)) => out.push(Difference::removed(path, r)),
        (Some(l), Some(r)) => match (l, r) {
            (PolicyNode::Map(lm), PolicyNode::Map(rm)) => diff_maps(&path, lm, rm, out),
            (PolicyNode::ScalarSet(ls), PolicyNode::ScalarSet(rs)) => diff_sets(path, ls, rs, out),
            (PolicyNode::Scalar(ls), PolicyNode::Scalar(rs)) => {
                if ls != rs {
                    out.push(Difference::modified(path, l, r));
                }
            }
            // Shape change (e.g. scalar on one side, set on the other).
            _ => out.push(Difference::modified(path, l, r)),
        },
    }
}

/// Set-valued fields compare as unordered sets.
///
/// Emits at most one `add` (members only in live) followed by at most one
/// `remove` (members only in the baseline), both carrying the full
/// reference set as `oldValue` and the full live set as `newValue`.
fn diff_sets(
    path: String,
    live: &BTreeSet<Scalar>,
    reference: &BTreeSet<Scalar>,
    out: &mut Vec<Difference>,
) {
    let added: Vec<Value> = live.difference(reference).map(Scalar::to_json).collect();
    let removed: Vec<Value> = reference.difference(live).map(Scalar::to_json).collect();
    if added.is_empty() && removed.is_empty() {
        return;
    }

    let old_value = Some(set_to_json(reference));
    let new_value = Some(set_to_json(live));
    if !added.is_empty() {
        out.push(Difference {
            path: path.clone(),
            operation: ChangeOperation::Add,
            old_value: old_value.clone(),
            new_value: new_value.clone(),
            elements: added,
        });
    }
    if !removed.is_empty() {
        out.push(Difference {
            path,
            operation: ChangeOperation::Remove,
            old_value,
            new_value,
            elements: removed,
        });
    }
}
