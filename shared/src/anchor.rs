//! Anchors findings to leaves of a rendered document.
//!
//! The pass is split into pure steps: leaves come from [`ContentTree`],
//! [`match_eligible`] pairs them with findings, and [`apply_placements`]
//! splices overlay markup into a copy of the document. Nothing here mounts
//! UI; callers receive `(leaf, finding)` placements and decide how to render.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::dto::{Finding, FindingId};
use crate::matcher::{eligible_leaves, match_eligible, EligibleLeaf, MatchPolicy, MatchResult, MatchTier};
use crate::overlay::OverlayRenderer;
use crate::tree::{ContentLeaf, ContentTree};

/// Diagnostic events of one anchoring pass. None of them is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorEvent {
    PassStarted {
        leaves: usize,
        findings: usize,
    },
    LeafMatched {
        ordinal: usize,
        finding_id: FindingId,
        tier: MatchTier,
    },
    LeafUnmatched {
        ordinal: usize,
        text: String,
    },
    FindingUnmatched {
        finding_id: FindingId,
    },
    PassFinished(AnchorSummary),
}

/// Sink for [`AnchorEvent`]s.
pub trait Diagnostics: Send + Sync {
    fn record(&self, event: &AnchorEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn record(&self, _event: &AnchorEvent) {}
}

/// Forwards events to `tracing`; per-leaf events at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: &AnchorEvent) {
        match event {
            AnchorEvent::PassStarted { leaves, findings } => {
                debug!(leaves, findings, "anchoring pass started");
            }
            AnchorEvent::LeafMatched {
                ordinal,
                finding_id,
                tier,
            } => {
                debug!(ordinal, %finding_id, %tier, "leaf matched");
            }
            AnchorEvent::LeafUnmatched { ordinal, text } => {
                let preview: String = text.chars().take(80).collect();
                debug!(ordinal, %preview, "no finding matched leaf");
            }
            AnchorEvent::FindingUnmatched { finding_id } => {
                debug!(%finding_id, "finding not anchored");
            }
            AnchorEvent::PassFinished(summary) => {
                info!(
                    leaves = summary.leaves,
                    eligible = summary.eligible_leaves,
                    matches = summary.matches,
                    matched_findings = summary.matched_findings,
                    findings = summary.findings,
                    "anchoring pass finished"
                );
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnchorSummary {
    pub leaves: usize,
    pub eligible_leaves: usize,
    pub matches: usize,
    pub findings: usize,
    pub matched_findings: usize,
    pub unmatched_findings: Vec<FindingId>,
}

/// A matched leaf bound to the finding it displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub leaf: ContentLeaf,
    pub finding_id: FindingId,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnchorOutcome {
    pub results: Vec<MatchResult>,
    pub placements: Vec<Placement>,
    pub summary: AnchorSummary,
}

#[derive(Clone)]
pub struct ContentAnchorEngine {
    policy: MatchPolicy,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for ContentAnchorEngine {
    fn default() -> Self {
        Self::new(MatchPolicy::default())
    }
}

impl ContentAnchorEngine {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            policy,
            diagnostics: Arc::new(NoopDiagnostics),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Run a complete pass over a settled tree. Empty trees and empty finding
    /// lists give an empty outcome.
    pub fn anchor(&self, tree: &ContentTree, findings: &[Finding]) -> AnchorOutcome {
        if tree.is_empty() || findings.is_empty() {
            return AnchorOutcome {
                summary: AnchorSummary {
                    leaves: tree.leaves().len(),
                    findings: findings.len(),
                    unmatched_findings: findings.iter().map(|f| f.id.clone()).collect(),
                    ..AnchorSummary::default()
                },
                ..AnchorOutcome::default()
            };
        }

        let leaves = tree.leaves();
        self.diagnostics.record(&AnchorEvent::PassStarted {
            leaves: leaves.len(),
            findings: findings.len(),
        });

        let eligible = eligible_leaves(leaves, &self.policy);
        let results = match_eligible(findings, &eligible, &self.policy);

        let by_ordinal: HashMap<usize, &MatchResult> =
            results.iter().map(|r| (r.leaf_ordinal, r)).collect();
        let mut placements = Vec::with_capacity(results.len());
        for EligibleLeaf { leaf, text } in &eligible {
            match by_ordinal.get(&leaf.ordinal) {
                Some(result) => {
                    self.diagnostics.record(&AnchorEvent::LeafMatched {
                        ordinal: leaf.ordinal,
                        finding_id: result.finding_id.clone(),
                        tier: result.tier,
                    });
                    placements.push(Placement {
                        leaf: (*leaf).clone(),
                        finding_id: result.finding_id.clone(),
                        tier: result.tier,
                    });
                }
                None => self.diagnostics.record(&AnchorEvent::LeafUnmatched {
                    ordinal: leaf.ordinal,
                    text: text.clone(),
                }),
            }
        }

        let matched: HashSet<&str> = results.iter().map(|r| r.finding_id.as_str()).collect();
        let unmatched_findings: Vec<FindingId> = findings
            .iter()
            .filter(|f| !matched.contains(f.id.as_str()))
            .map(|f| f.id.clone())
            .collect();
        for finding_id in &unmatched_findings {
            self.diagnostics.record(&AnchorEvent::FindingUnmatched {
                finding_id: finding_id.clone(),
            });
        }

        let summary = AnchorSummary {
            leaves: leaves.len(),
            eligible_leaves: eligible.len(),
            matches: results.len(),
            findings: findings.len(),
            matched_findings: matched.len(),
            unmatched_findings,
        };
        self.diagnostics
            .record(&AnchorEvent::PassFinished(summary.clone()));

        AnchorOutcome {
            results,
            placements,
            summary,
        }
    }
}

/// Rebuild the document with every placed leaf's content replaced by the
/// renderer's output. Bytes outside the placed spans are copied unchanged.
/// A placement is skipped when its finding is gone or its span no longer
/// holds the leaf it was computed from (a placement from another tree).
pub fn apply_placements(
    tree: &ContentTree,
    placements: &[Placement],
    findings: &[Finding],
    renderer: &dyn OverlayRenderer,
) -> String {
    let markup = tree.markup();
    let by_id: HashMap<&str, &Finding> = findings.iter().map(|f| (f.id.as_str(), f)).collect();

    let mut ordered: Vec<&Placement> = placements.iter().collect();
    ordered.sort_by_key(|p| p.leaf.span.start);

    let mut out = String::with_capacity(markup.len());
    let mut cursor = 0usize;
    for placement in ordered {
        let span = placement.leaf.span.clone();
        if span.start < cursor || markup.get(span.clone()) != Some(placement.leaf.markup.as_str()) {
            debug!(ordinal = placement.leaf.ordinal, "skipping placement that does not fit this tree");
            continue;
        }
        let Some(finding) = by_id.get(placement.finding_id.as_str()) else {
            continue;
        };
        out.push_str(&markup[cursor..span.start]);
        out.push_str(&renderer.render(finding, placement.tier));
        cursor = span.end;
    }
    out.push_str(&markup[cursor..]);
    out
}
