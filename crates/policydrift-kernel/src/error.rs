//! Error types for policydrift kernel operations.
//!
//! Run-level errors ([`MatchError`]) abort a comparison before any diffing
//! starts. Per-policy errors ([`MalformedPolicyError`]) are recorded against
//! a single comparison. [`NormalizationWarning`] never blocks output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which input set a policy, key or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Live,
    Reference,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Fatal matcher errors. Never retried: identical inputs reproduce them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Several policies on one side resolve to the same matching key.
    #[error("ambiguous {side} match on key `{key}`: {} all resolve to it", .colliding.join(", "))]
    AmbiguousMatch {
        side: Side,
        key: String,
        colliding: Vec<String>,
    },

    /// A custom mapping entry names a policy that does not exist.
    #[error("custom mapping {side} key `{key}` does not resolve to any {side} policy")]
    MappingResolution { side: Side, key: String },
}

/// Anything that stops a comparison run from producing a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompareError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// A policy body that cannot be reduced to a policy tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed policy {policy} at `{path}`: {reason}")]
pub struct MalformedPolicyError {
    /// Policy label (name plus source file when known).
    pub policy: String,

    /// Dot path of the offending node; empty for the document root.
    pub path: String,

    pub reason: String,
}

/// Errors raised while building normalization tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("normalization table `{path}` has no entries")]
    Empty { path: String },

    #[error("normalization table `{path}` is not a bijection: {detail}")]
    NotBijective { path: String, detail: String },

    #[error("normalization table for `{path}` is already registered")]
    DuplicatePath { path: String },
}

/// A raw value for a normalized field that matches no table entry.
///
/// The value passes through unchanged; the warning travels with the
/// comparison it was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationWarning {
    pub path: String,
    pub raw: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl NormalizationWarning {
    pub fn new(path: impl Into<String>, raw: Value) -> Self {
        Self {
            path: path.into(),
            raw,
            side: None,
        }
    }

    pub fn on(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Some(side) => write!(
                f,
                "unknown value {} for normalized field `{}` ({side})",
                self.raw, self.path
            ),
            None => write!(
                f,
                "unknown value {} for normalized field `{}`",
                self.raw, self.path
            ),
        }
    }
}
