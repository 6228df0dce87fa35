//! Pairing live policies with their reference counterparts.
//!
//! Three strategies:
//!
//! - **by-name**: display names, exact or case-insensitive
//! - **by-id**: opaque ids, always exact; empty ids never match
//! - **custom-mapping**: explicit `(referenceKey, liveKey)` entries, with
//!   by-name matching for every policy no entry mentions
//!
//! Matching never guesses. Two policies on one side that resolve to the same
//! key are an [`MatchError::AmbiguousMatch`], and a mapping entry naming a
//! missing policy is a [`MatchError::MappingResolution`]; both abort the run.
//! Outputs are sorted by `(name, id)` so pairing does not depend on input
//! order.

use crate::document::PolicyDocument;
use crate::error::{MatchError, Side};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How live policies are paired with reference policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    #[default]
    ByName,
    ById,
    CustomMapping,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByName => write!(f, "by-name"),
            Self::ById => write!(f, "by-id"),
            Self::CustomMapping => write!(f, "custom-mapping"),
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "by-name" | "name" => Ok(Self::ByName),
            "by-id" | "id" => Ok(Self::ById),
            "custom-mapping" | "mapping" => Ok(Self::CustomMapping),
            _ => Err(format!("unknown matching strategy: {s}")),
        }
    }
}

/// One explicit pairing from a custom mapping file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub reference_key: String,
    pub live_key: String,
}

impl MappingEntry {
    pub fn new(reference_key: impl Into<String>, live_key: impl Into<String>) -> Self {
        Self {
            reference_key: reference_key.into(),
            live_key: live_key.into(),
        }
    }
}

/// Matching configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchingOptions {
    pub strategy: MatchStrategy,
    /// Applies to name comparison only; ids are always exact.
    pub case_sensitive: bool,
    /// Consulted only by [`MatchStrategy::CustomMapping`].
    pub custom_mapping: Vec<MappingEntry>,
}

impl MatchingOptions {
    pub fn by_name(case_sensitive: bool) -> Self {
        Self {
            strategy: MatchStrategy::ByName,
            case_sensitive,
            custom_mapping: Vec::new(),
        }
    }

    pub fn by_id() -> Self {
        Self {
            strategy: MatchStrategy::ById,
            ..Self::default()
        }
    }

    pub fn custom_mapping(entries: Vec<MappingEntry>, case_sensitive: bool) -> Self {
        Self {
            strategy: MatchStrategy::CustomMapping,
            case_sensitive,
            custom_mapping: entries,
        }
    }
}

/// A live policy and the reference policy it was paired with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair<'a> {
    pub live: &'a PolicyDocument,
    pub reference: &'a PolicyDocument,
}

/// The three-way partition produced by [`match_policies`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome<'a> {
    pub pairs: Vec<MatchedPair<'a>>,
    pub only_in_live: Vec<&'a PolicyDocument>,
    pub only_in_reference: Vec<&'a PolicyDocument>,
}

impl MatchOutcome<'_> {
    /// Number of distinct policy identities across both sides.
    pub fn identity_count(&self) -> usize {
        self.pairs.len() + self.only_in_live.len() + self.only_in_reference.len()
    }
}

/// Partition `live` and `reference` into pairs and one-sided leftovers.
pub fn match_policies<'a>(
    live: &'a [PolicyDocument],
    reference: &'a [PolicyDocument],
    options: &MatchingOptions,
) -> Result<MatchOutcome<'a>, MatchError> {
    let all_live: BTreeSet<usize> = (0..live.len()).collect();
    let all_reference: BTreeSet<usize> = (0..reference.len()).collect();

    let (explicit, live_left, reference_left) = match options.strategy {
        MatchStrategy::ByName | MatchStrategy::ById => (Vec::new(), all_live, all_reference),
        MatchStrategy::CustomMapping => resolve_mapping(live, reference, options)?,
    };

    let keyed = match options.strategy {
        MatchStrategy::ById => pair_by_key(live, reference, &live_left, &reference_left, |doc| {
            (!doc.id.is_empty()).then(|| doc.id.clone())
        })?,
        MatchStrategy::ByName | MatchStrategy::CustomMapping => {
            let case_sensitive = options.case_sensitive;
            pair_by_key(live, reference, &live_left, &reference_left, |doc| {
                Some(name_key(&doc.name, case_sensitive))
            })?
        }
    };

    let mut paired_live = BTreeSet::new();
    let mut paired_reference = BTreeSet::new();
    let mut pairs = Vec::new();
    for (l, r) in explicit.into_iter().chain(keyed) {
        paired_live.insert(l);
        paired_reference.insert(r);
        pairs.push(MatchedPair {
            live: &live[l],
            reference: &reference[r],
        });
    }

    let mut only_in_live: Vec<&PolicyDocument> = (0..live.len())
        .filter(|i| !paired_live.contains(i))
        .map(|i| &live[i])
        .collect();
    let mut only_in_reference: Vec<&PolicyDocument> = (0..reference.len())
        .filter(|i| !paired_reference.contains(i))
        .map(|i| &reference[i])
        .collect();

    pairs.sort_by(|a, b| {
        document_order(a.live, b.live).then_with(|| document_order(a.reference, b.reference))
    });
    only_in_live.sort_by(|a, b| document_order(a, b));
    only_in_reference.sort_by(|a, b| document_order(a, b));

    Ok(MatchOutcome {
        pairs,
        only_in_live,
        only_in_reference,
    })
}

/// Stable total order over documents: name, id, then source file.
pub fn document_order(a: &PolicyDocument, b: &PolicyDocument) -> std::cmp::Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.source.cmp(&b.source))
}

fn name_key(name: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Index `candidates` by key, failing if any key is claimed twice.
fn index_by_key(
    docs: &[PolicyDocument],
    candidates: &BTreeSet<usize>,
    side: Side,
    key_of: &impl Fn(&PolicyDocument) -> Option<String>,
) -> Result<BTreeMap<String, usize>, MatchError> {
    let mut claims: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &index in candidates {
        if let Some(key) = key_of(&docs[index]) {
            claims.entry(key).or_default().push(index);
        }
    }

    let mut index = BTreeMap::new();
    for (key, holders) in claims {
        if holders.len() > 1 {
            let mut colliding: Vec<String> = holders.iter().map(|&i| docs[i].label()).collect();
            colliding.sort();
            return Err(MatchError::AmbiguousMatch {
                side,
                key,
                colliding,
            });
        }
        index.insert(key, holders[0]);
    }
    Ok(index)
}

fn pair_by_key(
    live: &[PolicyDocument],
    reference: &[PolicyDocument],
    live_candidates: &BTreeSet<usize>,
    reference_candidates: &BTreeSet<usize>,
    key_of: impl Fn(&PolicyDocument) -> Option<String>,
) -> Result<Vec<(usize, usize)>, MatchError> {
    let reference_index = index_by_key(reference, reference_candidates, Side::Reference, &key_of)?;
    let live_index = index_by_key(live, live_candidates, Side::Live, &key_of)?;

    Ok(live_index
        .iter()
        .filter_map(|(key, &l)| reference_index.get(key).map(|&r| (l, r)))
        .collect())
}

type MappingResolution = (Vec<(usize, usize)>, BTreeSet<usize>, BTreeSet<usize>);

/// Resolve every mapping entry to a `(live, reference)` index pair.
///
/// Returns the explicit pairs and the indices left for by-name fallback.
fn resolve_mapping(
    live: &[PolicyDocument],
    reference: &[PolicyDocument],
    options: &MatchingOptions,
) -> Result<MappingResolution, MatchError> {
    let mut live_claims: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut reference_claims: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut pairs = Vec::new();

    for entry in &options.custom_mapping {
        let r = resolve_key(
            reference,
            Side::Reference,
            &entry.reference_key,
            options.case_sensitive,
        )?;
        let l = resolve_key(live, Side::Live, &entry.live_key, options.case_sensitive)?;
        live_claims.entry(l).or_default().push(entry.live_key.clone());
        reference_claims
            .entry(r)
            .or_default()
            .push(entry.reference_key.clone());
        pairs.push((l, r));
    }

    for (side, docs, claims) in [
        (Side::Reference, reference, &reference_claims),
        (Side::Live, live, &live_claims),
    ] {
        if let Some((&index, keys)) = claims.iter().find(|(_, keys)| keys.len() > 1) {
            let mut colliding = keys.clone();
            colliding.sort();
            return Err(MatchError::AmbiguousMatch {
                side,
                key: docs[index].label(),
                colliding,
            });
        }
    }

    pairs.sort_unstable();
    let live_left: BTreeSet<usize> = (0..live.len())
        .filter(|i| !live_claims.contains_key(i))
        .collect();
    let reference_left: BTreeSet<usize> = (0..reference.len())
        .filter(|i| !reference_claims.contains_key(i))
        .collect();
    Ok((pairs, live_left, reference_left))
}

/// Resolve a mapping key against ids first, then names.
fn resolve_key(
    docs: &[PolicyDocument],
    side: Side,
    key: &str,
    case_sensitive: bool,
) -> Result<usize, MatchError> {
    let by_id: Vec<usize> = (0..docs.len())
        .filter(|&i| !docs[i].id.is_empty() && docs[i].id == key)
        .collect();
    let hits: Vec<usize> = if by_id.is_empty() {
        let wanted = name_key(key, case_sensitive);
        (0..docs.len())
            .filter(|&i| name_key(&docs[i].name, case_sensitive) == wanted)
            .collect()
    } else {
        by_id
    };

    match hits.as_slice() {
        [] => Err(MatchError::MappingResolution {
            side,
            key: key.to_string(),
        }),
        [single] => Ok(*single),
        many => {
            let mut colliding: Vec<String> = many.iter().map(|&i| docs[i].label()).collect();
            colliding.sort();
            Err(MatchError::AmbiguousMatch {
                side,
                key: key.to_string(),
                colliding,
            })
        }
    }
}
