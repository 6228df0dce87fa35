//! Verdict derivation and the exit-code contract.
//!
//! ```text
//! any Critical change                 → 2 Blocking
//! differing policies > maxDifferences → 2 Blocking
//! any Failed comparison               → 3 Error
//! any differing policy                → 1 Drift
//! otherwise                           → 0 Clean
//! ```
//!
//! Run-level failures (matching errors, unreadable input, cancellation)
//! never reach [`Verdict::derive`]; callers map them to [`Verdict::Error`].

use crate::orchestrator::ComparisonSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Drift,
    Blocking,
    Error,
}

impl Verdict {
    pub fn derive(summary: &ComparisonSummary, max_differences: Option<usize>) -> Self {
        let over_threshold =
            max_differences.is_some_and(|limit| summary.differing_policies > limit);
        if summary.critical_changes > 0 || over_threshold {
            Self::Blocking
        } else if summary.failed > 0 {
            Self::Error
        } else if summary.differing_policies > 0 {
            Self::Drift
        } else {
            Self::Clean
        }
    }

    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Drift => 1,
            Self::Blocking => 2,
            Self::Error => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Drift => "drift",
            Self::Blocking => "blocking",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(differing: usize, critical: usize, failed: usize) -> ComparisonSummary {
        ComparisonSummary {
            total: differing + failed,
            different: differing,
            failed,
            differing_policies: differing,
            critical_changes: critical,
            non_critical_changes: differing,
            ..ComparisonSummary::default()
        }
    }

    #[test]
    fn empty_run_is_clean() {
        assert_eq!(Verdict::derive(&ComparisonSummary::default(), None), Verdict::Clean);
        assert_eq!(Verdict::Clean.exit_code(), 0);
    }

    #[test]
    fn non_critical_drift_within_threshold_is_drift() {
        assert_eq!(Verdict::derive(&summary(2, 0, 0), Some(2)), Verdict::Drift);
        assert_eq!(Verdict::derive(&summary(2, 0, 0), None), Verdict::Drift);
    }

    #[test]
    fn exceeding_threshold_blocks() {
        let verdict = Verdict::derive(&summary(3, 0, 0), Some(2));
        assert_eq!(verdict, Verdict::Blocking);
        assert_eq!(verdict.exit_code(), 2);
    }

    #[test]
    fn critical_dominates_everything() {
        assert_eq!(Verdict::derive(&summary(1, 1, 0), None), Verdict::Blocking);
        assert_eq!(Verdict::derive(&summary(1, 1, 4), Some(100)), Verdict::Blocking);
    }

    #[test]
    fn failed_comparison_without_blocking_drift_is_error() {
        assert_eq!(Verdict::derive(&summary(1, 0, 1), None), Verdict::Error);
        assert_eq!(Verdict::Error.exit_code(), 3);
    }

    #[test]
    fn labels_are_stable() {
        let labels: Vec<&str> = [
            Verdict::Clean,
            Verdict::Drift,
            Verdict::Blocking,
            Verdict::Error,
        ]
        .into_iter()
        .map(Verdict::label)
        .collect();
        assert_eq!(labels, vec!["clean", "drift", "blocking", "error"]);
    }
}
