//! Policy trees: the typed shape a policy body is reduced to before diffing.
//!
//! ```text
//! PolicyNode
//!   ├─ Scalar      null | bool | integer | decimal | text
//!   ├─ ScalarSet   unordered set of scalars (JSON arrays of primitives)
//!   └─ Map         named fields → PolicyNode
//! ```
//!
//! Field names are compared ASCII-case-insensitively: a map is keyed by the
//! folded name and remembers the spelling it was loaded with. Two fields
//! that differ only in case make the tree malformed.
//!
//! A node is *vacant* when it is null, an empty set, or a map whose every
//! field is vacant. Vacant nodes are equivalent to absent fields.

use crate::document::PolicyDocument;
use crate::error::MalformedPolicyError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Join a parent dot path and a field name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Fold a field name or dot path for case-insensitive comparison.
pub fn fold_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A leaf value.
///
/// Non-integer numbers are kept as their JSON text so that scalars stay
/// totally ordered and hashable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(String),
    Text(String),
}

impl Scalar {
    /// Convert a JSON primitive. Returns `None` for arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Decimal(n.to_string()),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Decimal(text) => text
                .parse::<Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(text.clone())),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(text) => write!(f, "{text}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Coarse node kind, for messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    ScalarSet,
    Map,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::ScalarSet => write!(f, "set"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// One node of a policy tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyNode {
    Scalar(Scalar),
    ScalarSet(BTreeSet<Scalar>),
    Map(PolicyMap),
}

impl PolicyNode {
    /// Convert a JSON value rooted at `path`.
    ///
    /// Fails with `(path, reason)` when an array holds a non-primitive or an
    /// object holds two keys that fold to the same name.
    pub(crate) fn from_json(path: &str, value: &Value) -> Result<Self, (String, String)> {
        match value {
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for (index, item) in items.iter().enumerate() {
                    let Some(scalar) = Scalar::from_json(item) else {
                        return Err((
                            format!("{}[{index}]", path),
                            "lists may only contain primitive values".to_string(),
                        ));
                    };
                    set.insert(scalar);
                }
                Ok(Self::ScalarSet(set))
            }
            Value::Object(fields) => PolicyMap::from_json(path, fields).map(Self::Map),
            primitive => Ok(Self::Scalar(
                Scalar::from_json(primitive).unwrap_or(Scalar::Null),
            )),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Scalar(_) => NodeKind::Scalar,
            Self::ScalarSet(_) => NodeKind::ScalarSet,
            Self::Map(_) => NodeKind::Map,
        }
    }

    /// Whether this node is equivalent to an absent field.
    pub fn is_vacant(&self) -> bool {
        match self {
            Self::Scalar(scalar) => scalar.is_null(),
            Self::ScalarSet(set) => set.is_empty(),
            Self::Map(map) => map.iter().all(|(_, node)| node.is_vacant()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Scalar(scalar) => scalar.to_json(),
            Self::ScalarSet(set) => set_to_json(set),
            Self::Map(map) => map.to_json(),
        }
    }
}

/// Render a scalar set as a JSON array in canonical order.
pub fn set_to_json<'a>(set: impl IntoIterator<Item = &'a Scalar>) -> Value {
    Value::Array(set.into_iter().map(Scalar::to_json).collect())
}

/// A field as loaded: its original spelling and its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub node: PolicyNode,
}

/// Named fields keyed by folded name, iterated in lexicographic folded order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyMap {
    fields: BTreeMap<String, Field>,
}

impl PolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_json(path: &str, object: &Map<String, Value>) -> Result<Self, (String, String)> {
        let mut map = Self::new();
        for (name, value) in object {
            let child_path = join_path(path, name);
            let node = PolicyNode::from_json(&child_path, value)?;
            if let Some(previous) = map.insert(name.clone(), node) {
                return Err((
                    child_path,
                    format!(
                        "field `{name}` collides with `{}` (names compare case-insensitively)",
                        previous.name
                    ),
                ));
            }
        }
        Ok(map)
    }

    /// Insert a field, returning the field it displaced (if any).
    pub fn insert(&mut self, name: impl Into<String>, node: PolicyNode) -> Option<Field> {
        let name = name.into();
        self.fields.insert(fold_key(&name), Field { name, node })
    }

    /// Lookup by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&PolicyNode> {
        self.fields.get(&fold_key(name)).map(|field| &field.node)
    }

    /// Lookup by an already-folded key.
    pub fn field(&self, folded: &str) -> Option<&Field> {
        self.fields.get(folded)
    }

    /// Folded keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `(original name, node)` pairs in folded-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PolicyNode)> {
        self.fields
            .values()
            .map(|field| (field.name.as_str(), &field.node))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .iter()
            .map(|(name, node)| (name.to_string(), node.to_json()))
            .collect();
        Value::Object(object)
    }
}

/// SHA-256 digest over a tree's canonical form.
///
/// The canonical form uses folded field names, so two trees that differ only
/// in field-name casing share a digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub String);

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated policy body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTree {
    root: PolicyMap,
}

impl PolicyTree {
    pub fn from_map(root: PolicyMap) -> Self {
        Self { root }
    }

    /// Validate a document body into a tree. The body must be a JSON object.
    pub fn from_document(document: &PolicyDocument) -> Result<Self, MalformedPolicyError> {
        let malformed = |path: String, reason: String| MalformedPolicyError {
            policy: document.label(),
            path,
            reason,
        };
        let Value::Object(fields) = &document.body else {
            return Err(malformed(
                String::new(),
                "policy body must be a JSON object".to_string(),
            ));
        };
        let root =
            PolicyMap::from_json("", fields).map_err(|(path, reason)| malformed(path, reason))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PolicyMap {
        &self.root
    }

    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }

    /// Deterministic digest of the tree's content.
    ///
    /// Vacant fields are skipped so that the digest agrees with the diff
    /// engine's notion of equivalence.
    pub fn digest(&self) -> ContentDigest {
        let mut hasher = Sha256::new();
        feed_map(&mut hasher, &self.root);
        ContentDigest(format!("{:x}", hasher.finalize()))
    }
}

// Every key and scalar is written as tag, byte length, bytes, so the
// encoding is injective for any field name.
fn feed_map(hasher: &mut Sha256, map: &PolicyMap) {
    hasher.update(b"{");
    for key in map.keys() {
        let Some(field) = map.field(key) else {
            continue;
        };
        if field.node.is_vacant() {
            continue;
        }
        feed_tagged(hasher, b'k', key);
        feed_node(hasher, &field.node);
    }
    hasher.update(b"}");
}

fn feed_node(hasher: &mut Sha256, node: &PolicyNode) {
    match node {
        PolicyNode::Scalar(scalar) => feed_scalar(hasher, scalar),
        PolicyNode::ScalarSet(set) => {
            hasher.update(b"[");
            for scalar in set {
                feed_scalar(hasher, scalar);
            }
            hasher.update(b"]");
        }
        PolicyNode::Map(map) => feed_map(hasher, map),
    }
}

fn feed_scalar(hasher: &mut Sha256, scalar: &Scalar) {
    // Tag byte keeps `1` and `"1"` apart.
    match scalar {
        Scalar::Null => feed_tagged(hasher, b'n', ""),
        Scalar::Bool(b) => feed_tagged(hasher, b'b', &b.to_string()),
        Scalar::Integer(i) => feed_tagged(hasher, b'i', &i.to_string()),
        Scalar::Decimal(text) => feed_tagged(hasher, b'd', text),
        Scalar::Text(s) => feed_tagged(hasher, b's', s),
    }
}

fn feed_tagged(hasher: &mut Sha256, tag: u8, body: &str) {
    hasher.update([tag]);
    hasher.update(body.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(body.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(body: Value) -> PolicyTree {
        PolicyTree::from_document(&PolicyDocument::new("id", "policy", body))
            .expect("body should be well-formed")
    }

    #[test]
    fn arrays_of_primitives_become_sets() {
        let t = tree(json!({"conditions": {"clientAppTypes": ["browser", "other", "browser"]}}));
        let Some(PolicyNode::Map(conditions)) = t.root().get("conditions") else {
            panic!("conditions should be a map");
        };
        let Some(PolicyNode::ScalarSet(set)) = conditions.get("clientAppTypes") else {
            panic!("clientAppTypes should be a set");
        };
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let t = tree(json!({"State": "enabled"}));
        assert_eq!(
            t.root().get("state"),
            Some(&PolicyNode::Scalar(Scalar::Text("enabled".into())))
        );
        assert_eq!(t.root().iter().next().map(|(name, _)| name), Some("State"));
    }

    #[test]
    fn non_object_body_is_malformed() {
        let doc = PolicyDocument::new("id", "Broken", json!(["not", "a", "map"])).with_source("b.json");
        let err = PolicyTree::from_document(&doc).expect_err("array body must be rejected");
        assert_eq!(err.policy, "Broken (b.json)");
        assert_eq!(err.path, "");
    }

    #[test]
    fn nested_arrays_are_malformed_with_path() {
        let doc = PolicyDocument::new(
            "id",
            "Nested",
            json!({"conditions": {"users": {"includeUsers": [["a"]]}}}),
        );
        let err = PolicyTree::from_document(&doc).expect_err("nested list must be rejected");
        assert_eq!(err.path, "conditions.users.includeUsers[0]");
    }

    #[test]
    fn case_colliding_fields_are_malformed() {
        let doc = PolicyDocument::new("id", "Dup", json!({"state": "enabled", "State": "disabled"}));
        let err = PolicyTree::from_document(&doc).expect_err("colliding names must be rejected");
        assert!(err.reason.contains("case-insensitively"));
    }

    #[test]
    fn vacancy_covers_null_empty_and_hollow_maps() {
        assert!(PolicyNode::Scalar(Scalar::Null).is_vacant());
        assert!(PolicyNode::ScalarSet(BTreeSet::new()).is_vacant());

        let mut hollow = PolicyMap::new();
        hollow.insert("sessionControls", PolicyNode::Scalar(Scalar::Null));
        assert!(PolicyNode::Map(hollow).is_vacant());

        assert!(!PolicyNode::Scalar(Scalar::Bool(false)).is_vacant());
    }

    #[test]
    fn digest_ignores_key_order_case_and_vacant_fields() {
        let a = tree(json!({"state": "enabled", "displayName": "x", "sessionControls": null}));
        let b = tree(json!({"DisplayName": "x", "State": "enabled"}));
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn digest_separates_integer_and_text() {
        let a = tree(json!({"state": 1}));
        let b = tree(json!({"state": "1"}));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_separates_keys_that_embed_encoding_bytes() {
        let live = tree(json!({"k:s1:v\nm": 1}));
        let reference = tree(json!({"k": "v", "m": 1}));
        assert_ne!(live.digest(), reference.digest());

        let joined = tree(json!({"ab": {"c": 1}}));
        let split = tree(json!({"a": {"bc": 1}}));
        assert_ne!(joined.digest(), split.digest());
    }

    #[test]
    fn decimal_round_trips_to_json_number() {
        let scalar = Scalar::from_json(&json!(1.5)).expect("number is a scalar");
        assert_eq!(scalar, Scalar::Decimal("1.5".into()));
        assert_eq!(scalar.to_json(), json!(1.5));
    }
}
