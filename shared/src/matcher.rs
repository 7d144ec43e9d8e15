//! Tiered matching of findings against content leaves.
//!
//! Tiers are tried per finding in order of strictness; the first finding in
//! list order that satisfies any tier claims the leaf.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::dto::{Finding, FindingId};
use crate::normalize::normalize;
use crate::similarity::similarity;
use crate::tree::ContentLeaf;

/// Whether a finding stays eligible after it claimed a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimMode {
    /// A finding may anchor several leaves carrying the same text.
    #[default]
    Reuse,
    /// A claimed finding is removed from the pool for the rest of the pass.
    Single,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchPolicy {
    /// Leaves whose normalized text is shorter than this (in chars) are skipped.
    pub min_leaf_chars: usize,
    /// Fuzzy tier requires a similarity strictly above this value.
    pub fuzzy_threshold: f64,
    pub claim_mode: ClaimMode,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_leaf_chars: 10,
            fuzzy_threshold: 0.90,
            claim_mode: ClaimMode::Reuse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchTier {
    Exact,
    Substring,
    ReverseSubstring,
    Fuzzy(f64),
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTier::Exact => f.write_str("exact"),
            MatchTier::Substring => f.write_str("substring"),
            MatchTier::ReverseSubstring => f.write_str("reverse-substring"),
            MatchTier::Fuzzy(score) => write!(f, "fuzzy:{score:.3}"),
        }
    }
}

impl Serialize for MatchTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub leaf_ordinal: usize,
    pub finding_id: FindingId,
    pub tier: MatchTier,
}

/// A finding prepared for matching.
struct Candidate<'a> {
    id: &'a FindingId,
    normalized: String,
}

/// Classify how `leaf` relates to `original`; both already normalized.
pub fn match_tier(leaf: &str, original: &str, fuzzy_threshold: f64) -> Option<MatchTier> {
    if original.is_empty() {
        return None;
    }
    if leaf == original {
        return Some(MatchTier::Exact);
    }
    if leaf.contains(original) {
        return Some(MatchTier::Substring);
    }
    if original.contains(leaf) {
        return Some(MatchTier::ReverseSubstring);
    }
    let score = similarity(leaf, original);
    (score > fuzzy_threshold).then_some(MatchTier::Fuzzy(score))
}

/// A leaf that passed the length filter, with its normalized text.
#[derive(Debug, Clone)]
pub struct EligibleLeaf<'a> {
    pub leaf: &'a ContentLeaf,
    pub text: String,
}

/// Normalize every leaf once and keep those long enough to be matched.
pub fn eligible_leaves<'a>(leaves: &'a [ContentLeaf], policy: &MatchPolicy) -> Vec<EligibleLeaf<'a>> {
    leaves
        .iter()
        .filter_map(|leaf| {
            let text = normalize(&leaf.markup);
            (text.chars().count() >= policy.min_leaf_chars).then_some(EligibleLeaf { leaf, text })
        })
        .collect()
}

/// Match every eligible leaf to the first satisfying finding. Pure: the same
/// inputs always give the same results.
pub fn match_findings(
    findings: &[Finding],
    leaves: &[ContentLeaf],
    policy: &MatchPolicy,
) -> Vec<MatchResult> {
    match_eligible(findings, &eligible_leaves(leaves, policy), policy)
}

/// [`match_findings`] over leaves already filtered by [`eligible_leaves`].
pub fn match_eligible(
    findings: &[Finding],
    leaves: &[EligibleLeaf<'_>],
    policy: &MatchPolicy,
) -> Vec<MatchResult> {
    let mut pool: Vec<Candidate<'_>> = findings
        .iter()
        .map(|f| Candidate {
            id: &f.id,
            normalized: normalize(&f.original),
        })
        .filter(|c| !c.normalized.is_empty())
        .collect();

    let mut results = Vec::new();
    for eligible in leaves {
        if pool.is_empty() {
            break;
        }
        let hit = pool.iter().enumerate().find_map(|(idx, c)| {
            match_tier(&eligible.text, &c.normalized, policy.fuzzy_threshold).map(|tier| (idx, tier))
        });
        if let Some((idx, tier)) = hit {
            results.push(MatchResult {
                leaf_ordinal: eligible.leaf.ordinal,
                finding_id: pool[idx].id.clone(),
                tier,
            });
            if policy.claim_mode == ClaimMode::Single {
                pool.remove(idx);
            }
        }
    }
    results
}
