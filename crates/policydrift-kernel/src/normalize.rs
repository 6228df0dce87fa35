//! Value normalization for fields with more than one valid representation.
//!
//! Some policy fields are exported either as numeric codes or as string
//! names depending on the tool that produced the file (`1` and `"mfa"` are
//! the same grant control). Each known field path owns one
//! [`NormalizationTable`] mapping codes to a canonical string; comparisons
//! then happen on canonical values only.
//!
//! Tables are built once into a [`NormalizationTables`] set and lent to a
//! [`ValueNormalizer`] for the lifetime of a run. Nothing here is mutable
//! after construction.

use crate::error::{NormalizationWarning, TableError};
use crate::tree::{PolicyMap, PolicyNode, PolicyTree, Scalar, fold_key, join_path};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Built-in table definitions: `(field path, [(code, canonical name)])`.
pub const BUILTIN_TABLES: [(&str, &[(i64, &str)]); 5] = [
    (
        "grantControls.builtInControls",
        &[
            (0, "block"),
            (1, "mfa"),
            (2, "compliantDevice"),
            (3, "domainJoinedDevice"),
            (4, "approvedApplication"),
            (5, "compliantApplication"),
            (6, "passwordChange"),
        ],
    ),
    (
        "conditions.clientAppTypes",
        &[
            (0, "all"),
            (1, "browser"),
            (2, "mobileAppsAndDesktopClients"),
            (3, "exchangeActiveSync"),
            (4, "easSupported"),
            (5, "other"),
        ],
    ),
    (
        "conditions.signInRiskLevels",
        &[
            (0, "low"),
            (1, "medium"),
            (2, "high"),
            (3, "hidden"),
            (4, "none"),
        ],
    ),
    (
        "conditions.userRiskLevels",
        &[
            (0, "low"),
            (1, "medium"),
            (2, "high"),
            (3, "hidden"),
            (4, "none"),
        ],
    ),
    (
        "state",
        &[
            (0, "enabled"),
            (1, "disabled"),
            (2, "enabledForReportingButNotEnforced"),
        ],
    ),
];

/// A bijection between numeric codes and canonical names for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationTable {
    path: String,
    by_code: BTreeMap<i64, String>,
    /// Folded name → canonical spelling.
    by_name: BTreeMap<String, String>,
}

impl NormalizationTable {
    /// Build a table, rejecting duplicate codes and duplicate names.
    pub fn new<S: AsRef<str>>(
        path: impl Into<String>,
        entries: &[(i64, S)],
    ) -> Result<Self, TableError> {
        let path = path.into();
        if entries.is_empty() {
            return Err(TableError::Empty { path });
        }

        let mut by_code = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        for (code, name) in entries {
            let name: &str = name.as_ref();
            if let Some(existing) = by_code.insert(*code, name.to_string()) {
                return Err(TableError::NotBijective {
                    path,
                    detail: format!("code {code} maps to both `{existing}` and `{name}`"),
                });
            }
            if let Some(existing) = by_name.insert(fold_key(name), name.to_string()) {
                return Err(TableError::NotBijective {
                    path,
                    detail: format!("name `{name}` collides with `{existing}`"),
                });
            }
        }

        Ok(Self {
            path,
            by_code,
            by_name,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `(code, canonical name)` in code order.
    pub fn entries(&self) -> impl Iterator<Item = (i64, &str)> {
        self.by_code.iter().map(|(code, name)| (*code, name.as_str()))
    }

    /// Canonical form of `raw`, or `None` when the value is not in the table.
    ///
    /// Accepts integer codes, strings holding integer codes, and names
    /// (case-insensitively).
    pub fn canonical(&self, raw: &Scalar) -> Option<Scalar> {
        let name = match raw {
            Scalar::Integer(code) => self.by_code.get(code),
            Scalar::Text(text) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(code) => self.by_code.get(&code),
                    Err(_) => self.by_name.get(&fold_key(text)),
                }
            }
            Scalar::Null | Scalar::Bool(_) | Scalar::Decimal(_) => None,
        }?;
        Some(Scalar::Text(name.clone()))
    }
}

/// The immutable set of tables for a run, keyed by folded field path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationTables {
    tables: BTreeMap<String, NormalizationTable>,
}

impl NormalizationTables {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in tables from [`BUILTIN_TABLES`].
    pub fn builtin() -> Result<Self, TableError> {
        BUILTIN_TABLES
            .iter()
            .try_fold(Self::empty(), |tables, (path, entries)| {
                tables.with_table(NormalizationTable::new(*path, *entries)?)
            })
    }

    /// Register one more table. Each field path may own one table.
    pub fn with_table(mut self, table: NormalizationTable) -> Result<Self, TableError> {
        let key = fold_key(table.path());
        if self.tables.contains_key(&key) {
            return Err(TableError::DuplicatePath {
                path: table.path().to_string(),
            });
        }
        self.tables.insert(key, table);
        Ok(self)
    }

    /// Table for a dot path, matched case-insensitively.
    pub fn get(&self, path: &str) -> Option<&NormalizationTable> {
        self.tables.get(&fold_key(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizationTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Result of normalizing one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub value: Scalar,
    pub warning: Option<NormalizationWarning>,
}

/// Canonicalizes values using a borrowed, read-only table set.
#[derive(Debug, Clone, Copy)]
pub struct ValueNormalizer<'t> {
    tables: &'t NormalizationTables,
}

impl<'t> ValueNormalizer<'t> {
    pub fn new(tables: &'t NormalizationTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &'t NormalizationTables {
        self.tables
    }

    /// Canonical form of `raw` at `path`.
    ///
    /// Unknown field paths pass through silently. Unknown values for a known
    /// path pass through with a warning; null is never warned about.
    pub fn normalize(&self, path: &str, raw: &Scalar) -> Normalized {
        let Some(table) = self.tables.get(path) else {
            return Normalized {
                value: raw.clone(),
                warning: None,
            };
        };
        match table.canonical(raw) {
            Some(value) => Normalized {
                value,
                warning: None,
            },
            None if raw.is_null() => Normalized {
                value: Scalar::Null,
                warning: None,
            },
            None => {
                warn!(path, raw = %raw, "value not in normalization table, comparing as-is");
                Normalized {
                    value: raw.clone(),
                    warning: Some(NormalizationWarning::new(path, raw.to_json())),
                }
            }
        }
    }

    /// Whether two raw values at `path` share a canonical form.
    pub fn equivalent(&self, path: &str, a: &Scalar, b: &Scalar) -> bool {
        self.normalize(path, a).value == self.normalize(path, b).value
    }

    /// Normalize every scalar of a tree, collecting warnings in tree order.
    pub fn normalize_tree(&self, tree: &PolicyTree) -> (PolicyTree, Vec<NormalizationWarning>) {
        let mut warnings = Vec::new();
        let root = self.normalize_map("", tree.root(), &mut warnings);
        (PolicyTree::from_map(root), warnings)
    }

    fn normalize_map(
        &self,
        prefix: &str,
        map: &PolicyMap,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> PolicyMap {
        let mut out = PolicyMap::new();
        for (name, node) in map.iter() {
            let path = join_path(prefix, name);
            let normalized = self.normalize_node(&path, node, warnings);
            out.insert(name, normalized);
        }
        out
    }

    fn normalize_node(
        &self,
        path: &str,
        node: &PolicyNode,
        warnings: &mut Vec<NormalizationWarning>,
    ) -> PolicyNode {
        match node {
            PolicyNode::Scalar(raw) => {
                let normalized = self.normalize(path, raw);
                warnings.extend(normalized.warning);
                PolicyNode::Scalar(normalized.value)
            }
            PolicyNode::ScalarSet(set) => {
                let mut out = BTreeSet::new();
                for raw in set {
                    let normalized = self.normalize(path, raw);
                    warnings.extend(normalized.warning);
                    out.insert(normalized.value);
                }
                PolicyNode::ScalarSet(out)
            }
            PolicyNode::Map(map) => PolicyNode::Map(self.normalize_map(path, map, warnings)),
        }
    }
}
