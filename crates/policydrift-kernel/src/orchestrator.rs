//! Comparison orchestration across a whole policy set.
//!
//! ```text
//! Matching ──► Diffing ──► Classifying ──► Aggregating ──► Done
//!    │            └── per policy, on a bounded worker pool
//!    └── MatchError aborts the run before any diffing
//! ```
//!
//! Workers pull comparison tasks from a shared atomic cursor and return
//! finished [`PolicyComparison`]s; aggregation sorts them by policy name so
//! the result never depends on scheduling. Cancellation is polled between
//! policies. A cancelled run returns [`RunOutcome::Cancelled`] and drops
//! everything computed so far.

use crate::classify::{Change, ClassificationRules, classify_all};
use crate::diff::diff;
use crate::document::PolicyDocument;
use crate::error::{MatchError, NormalizationWarning, Side};
use crate::matcher::{MatchedPair, MatchingOptions, match_policies};
use crate::normalize::ValueNormalizer;
use crate::tree::{ContentDigest, PolicyTree};
use crate::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Differing-policy count above which the verdict blocks. `None` means
    /// no threshold.
    pub max_differences: Option<usize>,

    /// Worker count; 0 is treated as 1.
    pub concurrency: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_differences: None,
            concurrency: 1,
        }
    }
}

/// Cooperative cancellation signal shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Matching,
    Diffing,
    Classifying,
    Aggregating,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Matching => "matching",
            Self::Diffing => "diffing",
            Self::Classifying => "classifying",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Identical,
    Different,
    OnlyInLive,
    OnlyInReference,
    Failed,
}

impl ComparisonStatus {
    /// Whether the policy counts towards `differingPolicies`.
    pub fn is_differing(self) -> bool {
        matches!(
            self,
            Self::Different | Self::OnlyInLive | Self::OnlyInReference
        )
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identical => "identical",
            Self::Different => "different",
            Self::OnlyInLive => "only in live",
            Self::OnlyInReference => "only in reference",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The outcome for one policy identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyComparison {
    /// Reference name for matched pairs, otherwise the one side's name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_source: Option<String>,
    pub status: ComparisonStatus,
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<NormalizationWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_digest: Option<ContentDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_digest: Option<ContentDigest>,
}

impl PolicyComparison {
    fn shell(name: &str, status: ComparisonStatus) -> Self {
        Self {
            name: name.to_string(),
            live_id: None,
            reference_id: None,
            reference_source: None,
            status,
            changes: Vec::new(),
            warnings: Vec::new(),
            error: None,
            live_digest: None,
            reference_digest: None,
        }
    }

    pub fn critical_changes(&self) -> usize {
        self.changes.iter().filter(|c| c.is_critical()).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub total: usize,
    pub identical: usize,
    pub different: usize,
    pub only_in_live: usize,
    pub only_in_reference: usize,
    pub failed: usize,
    pub differing_policies: usize,
    pub critical_changes: usize,
    pub non_critical_changes: usize,
}

impl ComparisonSummary {
    pub fn tally(comparisons: &[PolicyComparison]) -> Self {
        let mut summary = Self {
            total: comparisons.len(),
            ..Self::default()
        };
        for comparison in comparisons {
            match comparison.status {
                ComparisonStatus::Identical => summary.identical += 1,
                ComparisonStatus::Different => summary.different += 1,
                ComparisonStatus::OnlyInLive => summary.only_in_live += 1,
                ComparisonStatus::OnlyInReference => summary.only_in_reference += 1,
                ComparisonStatus::Failed => summary.failed += 1,
            }
            if comparison.status.is_differing() {
                summary.differing_policies += 1;
            }
            let critical = comparison.critical_changes();
            summary.critical_changes += critical;
            summary.non_critical_changes += comparison.changes.len() - critical;
        }
        summary
    }
}

/// Complete output of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub summary: ComparisonSummary,
    pub verdict: Verdict,
    pub comparisons: Vec<PolicyComparison>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ComparisonResult),
    Cancelled,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(result) => result.verdict.exit_code(),
            Self::Cancelled => Verdict::Error.exit_code(),
        }
    }
}

enum Task<'a> {
    Pair(MatchedPair<'a>),
    OnlyInLive(&'a PolicyDocument),
    OnlyInReference(&'a PolicyDocument),
}

/// Drives matching, diffing, classification and aggregation.
#[derive(Debug, Clone)]
pub struct Orchestrator<'n> {
    normalizer: ValueNormalizer<'n>,
    rules: ClassificationRules,
    settings: RunSettings,
    #[cfg(test)]
    after_task: Option<fn(&CancellationFlag)>,
}

impl<'n> Orchestrator<'n> {
    pub fn new(
        normalizer: ValueNormalizer<'n>,
        rules: ClassificationRules,
        settings: RunSettings,
    ) -> Self {
        Self {
            normalizer,
            rules,
            settings,
            #[cfg(test)]
            after_task: None,
        }
    }

    /// Runs `hook` on the worker after each finished comparison.
    #[cfg(test)]
    fn with_after_task(mut self, hook: fn(&CancellationFlag)) -> Self {
        self.after_task = Some(hook);
        self
    }

    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    pub fn run(
        &self,
        live: &[PolicyDocument],
        reference: &[PolicyDocument],
        options: &MatchingOptions,
        cancel: &CancellationFlag,
    ) -> Result<RunOutcome, MatchError> {
        debug!(
            phase = %RunPhase::Matching,
            live = live.len(),
            reference = reference.len(),
            strategy = %options.strategy,
            "comparison run started"
        );
        let outcome = match_policies(live, reference, options)?;
        debug!(
            pairs = outcome.pairs.len(),
            only_in_live = outcome.only_in_live.len(),
            only_in_reference = outcome.only_in_reference.len(),
            "policies matched"
        );

        let mut tasks: Vec<Task<'_>> = Vec::with_capacity(outcome.identity_count());
        tasks.extend(outcome.pairs.into_iter().map(Task::Pair));
        tasks.extend(outcome.only_in_live.into_iter().map(Task::OnlyInLive));
        tasks.extend(outcome.only_in_reference.into_iter().map(Task::OnlyInReference));

        debug!(phase = %RunPhase::Diffing, tasks = tasks.len(), "diffing policies");
        let Some(mut comparisons) = self.compare_all(&tasks, cancel) else {
            warn!("comparison run cancelled, discarding partial results");
            return Ok(RunOutcome::Cancelled);
        };

        debug!(phase = %RunPhase::Aggregating, "aggregating results");
        comparisons.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.status.cmp(&b.status))
                .then_with(|| a.live_id.cmp(&b.live_id))
                .then_with(|| a.reference_id.cmp(&b.reference_id))
                .then_with(|| a.reference_source.cmp(&b.reference_source))
        });
        let summary = ComparisonSummary::tally(&comparisons);
        let verdict = Verdict::derive(&summary, self.settings.max_differences);
        debug!(phase = %RunPhase::Done, verdict = %verdict, "comparison run finished");

        Ok(RunOutcome::Completed(ComparisonResult {
            summary,
            verdict,
            comparisons,
        }))
    }

    /// Run every task on the worker pool; `None` when cancelled.
    fn compare_all(
        &self,
        tasks: &[Task<'_>],
        cancel: &CancellationFlag,
    ) -> Option<Vec<PolicyComparison>> {
        let workers = self.settings.concurrency.max(1).min(tasks.len().max(1));
        let cursor = &AtomicUsize::new(0);

        let batches: Vec<Vec<PolicyComparison>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(move |_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while !cancel.is_cancelled() {
                            let next = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(task) = tasks.get(next) else {
                                break;
                            };
                            done.push(self.compare_task(task));
                            #[cfg(test)]
                            {
                                if let Some(hook) = self.after_task {
                                    hook(cancel);
                                }
                            }
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        if cancel.is_cancelled() {
            return None;
        }
        Some(batches.into_iter().flatten().collect())
    }

    fn compare_task(&self, task: &Task<'_>) -> PolicyComparison {
        match task {
            Task::Pair(pair) => self.compare_pair(pair),
            Task::OnlyInLive(doc) => self.one_sided(doc, Side::Live),
            Task::OnlyInReference(doc) => self.one_sided(doc, Side::Reference),
        }
    }

    fn compare_pair(&self, pair: &MatchedPair<'_>) -> PolicyComparison {
        let mut comparison =
            PolicyComparison::shell(&pair.reference.name, ComparisonStatus::Identical);
        comparison.live_id = Some(pair.live.id.clone());
        comparison.reference_id = Some(pair.reference.id.clone());
        comparison.reference_source = pair.reference.source.clone();

        let trees = PolicyTree::from_document(pair.live)
            .and_then(|live| PolicyTree::from_document(pair.reference).map(|r| (live, r)));
        let (live_raw, reference_raw) = match trees {
            Ok(trees) => trees,
            Err(err) => {
                warn!(policy = %pair.reference.name, error = %err, "policy comparison failed");
                comparison.status = ComparisonStatus::Failed;
                comparison.error = Some(err.to_string());
                return comparison;
            }
        };

        let (live, reference) = self.normalize_pair(&live_raw, &reference_raw, &mut comparison);
        let live_digest = live.digest();
        let reference_digest = reference.digest();
        let unchanged = live_digest == reference_digest;
        comparison.live_digest = Some(live_digest);
        comparison.reference_digest = Some(reference_digest);
        if unchanged {
            return comparison;
        }

        let differences = diff(&live, &reference);
        debug!(
            phase = %RunPhase::Classifying,
            policy = %comparison.name,
            differences = differences.len(),
            "classifying differences"
        );
        comparison.changes = classify_all(differences, &self.rules);
        if !comparison.changes.is_empty() {
            comparison.status = ComparisonStatus::Different;
        }
        comparison
    }

    fn normalize_pair(
        &self,
        live: &PolicyTree,
        reference: &PolicyTree,
        comparison: &mut PolicyComparison,
    ) -> (PolicyTree, PolicyTree) {
        let (live, live_warnings) = self.normalizer.normalize_tree(live);
        let (reference, reference_warnings) = self.normalizer.normalize_tree(reference);
        comparison
            .warnings
            .extend(live_warnings.into_iter().map(|w| w.on(Side::Live)));
        comparison
            .warnings
            .extend(reference_warnings.into_iter().map(|w| w.on(Side::Reference)));
        (live, reference)
    }

    /// One-sided policies are not diffed. A malformed body is noted but does
    /// not change the status.
    fn one_sided(&self, doc: &PolicyDocument, side: Side) -> PolicyComparison {
        let status = match side {
            Side::Live => ComparisonStatus::OnlyInLive,
            Side::Reference => ComparisonStatus::OnlyInReference,
        };
        let mut comparison = PolicyComparison::shell(&doc.name, status);
        match side {
            Side::Live => comparison.live_id = Some(doc.id.clone()),
            Side::Reference => {
                comparison.reference_id = Some(doc.id.clone());
                comparison.reference_source = doc.source.clone();
            }
        }

        match PolicyTree::from_document(doc) {
            Ok(tree) => {
                let (tree, warnings) = self.normalizer.normalize_tree(&tree);
                comparison
                    .warnings
                    .extend(warnings.into_iter().map(|w| w.on(side)));
                let digest = Some(tree.digest());
                match side {
                    Side::Live => comparison.live_digest = digest,
                    Side::Reference => comparison.reference_digest = digest,
                }
            }
            Err(err) => {
                warn!(policy = %doc.name, %side, error = %err, "one-sided policy is malformed");
                comparison.error = Some(err.to_string());
            }
        }
        comparison
    }
}
