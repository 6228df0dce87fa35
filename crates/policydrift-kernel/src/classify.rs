//! Change classification.
//!
//! Each [`Difference`] is resolved against three prefix sets, in order:
//!
//! ```text
//! ignore    → dropped, never reported
//! fail_on   → Critical
//! critical  → Critical   (built-in table unless replaced)
//! otherwise → NonCritical
//! ```
//!
//! Prefixes are dot paths matched segment-wise and ASCII-case-insensitively:
//! `conditions.users` covers `Conditions.Users.ExcludeUsers` but not
//! `conditions.usersRisk`.

use crate::diff::{ChangeOperation, Difference};
use crate::tree::fold_key;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Security-relevant subtrees that block promotion when changed.
pub const DEFAULT_CRITICAL_PREFIXES: [&str; 8] = [
    "grantControls",
    "sessionControls",
    "conditions.signInRiskLevels",
    "conditions.userRiskLevels",
    "conditions.servicePrincipalRiskLevels",
    "conditions.users",
    "conditions.applications",
    "state",
];

/// Sorted, case-folded set of dot-path prefixes.
///
/// Lookup walks the ancestors of a path (`a`, `a.b`, `a.b.c`) and
/// binary-searches each one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    entries: Vec<String>,
}

impl PrefixSet {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<String> = prefixes
            .into_iter()
            .map(|p| fold_key(p.as_ref().trim().trim_matches('.')))
            .filter(|p| !p.is_empty())
            .collect();
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// The longest entry covering `path`, if any.
    pub fn matching(&self, path: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let folded = fold_key(path);
        let mut best = None;
        let ends = folded
            .match_indices('.')
            .map(|(i, _)| i)
            .chain(std::iter::once(folded.len()));
        for end in ends {
            let ancestor = &folded[..end];
            if let Ok(i) = self.entries.binary_search_by(|e| e.as_str().cmp(ancestor)) {
                best = Some(self.entries[i].as_str());
            }
        }
        best
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matching(path).is_some()
    }
}

impl<S: AsRef<str>> FromIterator<S> for PrefixSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Caller-supplied classification configuration, immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    pub critical_path_prefixes: PrefixSet,
    pub fail_on: PrefixSet,
    pub ignore: PrefixSet,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            critical_path_prefixes: PrefixSet::new(DEFAULT_CRITICAL_PREFIXES),
            fail_on: PrefixSet::default(),
            ignore: PrefixSet::default(),
        }
    }
}

impl ClassificationRules {
    pub fn with_critical<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.critical_path_prefixes = PrefixSet::new(prefixes);
        self
    }

    pub fn with_fail_on<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fail_on = PrefixSet::new(prefixes);
        self
    }

    pub fn with_ignore<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore = PrefixSet::new(prefixes);
        self
    }

    /// Which rule decides `path`.
    pub fn resolve(&self, path: &str) -> PathClass {
        if self.ignore.matches(path) {
            PathClass::Ignored
        } else if self.fail_on.matches(path) {
            PathClass::FailOn
        } else if self.critical_path_prefixes.matches(path) {
            PathClass::DefaultCritical
        } else {
            PathClass::Unlisted
        }
    }
}

/// The rule that decided a path's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Ignored,
    FailOn,
    DefaultCritical,
    Unlisted,
}

impl PathClass {
    pub fn severity(self) -> Option<Severity> {
        match self {
            Self::Ignored => None,
            Self::FailOn | Self::DefaultCritical => Some(Severity::Critical),
            Self::Unlisted => Some(Severity::NonCritical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    NonCritical,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonCritical => write!(f, "non-critical"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Severity of one difference; `None` means the change is ignored.
pub fn classify(difference: &Difference, rules: &ClassificationRules) -> Option<Severity> {
    rules.resolve(&difference.path).severity()
}

/// A classified change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub path: String,
    pub operation: ChangeOperation,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Value>,
    pub severity: Severity,
}

impl Change {
    pub fn from_difference(difference: Difference, severity: Severity) -> Self {
        Self {
            path: difference.path,
            operation: difference.operation,
            old_value: difference.old_value,
            new_value: difference.new_value,
            elements: difference.elements,
            severity,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Classify a diff, dropping ignored changes and keeping diff order.
pub fn classify_all(differences: Vec<Difference>, rules: &ClassificationRules) -> Vec<Change> {
    differences
        .into_iter()
        .filter_map(|d| classify(&d, rules).map(|severity| Change::from_difference(d, severity)))
        .collect()
}
