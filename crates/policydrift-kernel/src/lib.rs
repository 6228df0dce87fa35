//! # Policydrift Kernel
//!
//! Compares a live set of access-control policies against a reference
//! baseline and turns the drift into a verdict a CI gate can act on.
//!
//! The kernel is pure and in-memory: it never fetches, loads or enforces
//! policies. Collaborators hand it [`PolicyDocument`]s and plain option
//! structs; it hands back a [`ComparisonResult`].
//!
//! ## Architecture
//!
//! ```text
//! PolicyDocument        ← raw id/name/body, live or reference
//!     │
//! PolicyTree            ← validated Scalar | ScalarSet | Map
//!     │
//! ValueNormalizer       ← per-path code tables (1 ≡ "mfa")
//!     │
//! match_policies        ← by-name | by-id | custom-mapping
//!     │
//! diff                  ← add / remove / modify at dot paths
//!     │
//! classify              ← ignore > fail-on > critical table
//!     │
//! Orchestrator          ← worker pool, aggregation, Verdict (0/1/2/3)
//! ```

pub mod classify;
pub mod diff;
pub mod document;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod tree;
pub mod verdict;

pub use classify::{
    Change, ClassificationRules, DEFAULT_CRITICAL_PREFIXES, PathClass, PrefixSet, Severity,
    classify, classify_all,
};
pub use diff::{ChangeOperation, Difference, diff};
pub use document::PolicyDocument;
pub use error::{
    CompareError, MalformedPolicyError, MatchError, NormalizationWarning, Side, TableError,
};
pub use matcher::{
    MappingEntry, MatchOutcome, MatchStrategy, MatchedPair, MatchingOptions, match_policies,
};
pub use normalize::{
    BUILTIN_TABLES, NormalizationTable, NormalizationTables, Normalized, ValueNormalizer,
};
pub use orchestrator::{
    CancellationFlag, ComparisonResult, ComparisonStatus, ComparisonSummary, Orchestrator,
    PolicyComparison, RunOutcome, RunPhase, RunSettings,
};
pub use tree::{ContentDigest, NodeKind, PolicyMap, PolicyNode, PolicyTree, Scalar};
pub use verdict::Verdict;
