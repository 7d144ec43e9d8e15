//! Display rules for the interactive unit that replaces a matched leaf.
//!
//! Everything here is derived from the finding's decision; there are no
//! separately stored visibility flags.

use serde::Serialize;

use crate::dto::{Decision, Finding, FindingId};
use crate::matcher::MatchTier;
use crate::normalize::escape_html;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayView {
    pub finding_id: FindingId,
    pub decision: Decision,
    /// Hidden once the suggestion is approved.
    pub show_original: bool,
    /// Original is struck through unless the suggestion was rejected.
    pub original_struck: bool,
    /// Rejected findings hide the suggestion.
    pub show_refined: bool,
    pub refined_editable: bool,
    pub original: String,
    pub refined: String,
}

impl OverlayView {
    pub fn of(finding: &Finding) -> Self {
        let approved = finding.decision == Decision::Approved;
        let rejected = finding.decision == Decision::Rejected;
        Self {
            finding_id: finding.id.clone(),
            decision: finding.decision,
            show_original: !approved,
            original_struck: !rejected,
            show_refined: !rejected,
            refined_editable: !rejected,
            original: finding.original.clone(),
            refined: finding.refined.clone(),
        }
    }
}

/// Produces the markup placed into a matched leaf.
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, finding: &Finding, tier: MatchTier) -> String;
}

/// Empty mount point; a client mounts its own component on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl OverlayRenderer for PlaceholderRenderer {
    fn render(&self, finding: &Finding, tier: MatchTier) -> String {
        format!(
            r#"<div class="review-overlay" data-finding-id="{}" data-match-tier="{}"></div>"#,
            escape_html(&finding.id),
            tier
        )
    }
}

/// Self-contained overlay markup reflecting the current decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticOverlayRenderer;

impl OverlayRenderer for StaticOverlayRenderer {
    fn render(&self, finding: &Finding, tier: MatchTier) -> String {
        let view = OverlayView::of(finding);
        let mut out = format!(
            r#"<div class="review-overlay" data-finding-id="{}" data-decision="{}" data-match-tier="{}">"#,
            escape_html(&view.finding_id),
            view.decision,
            tier
        );
        if view.show_original {
            let text = escape_html(&view.original);
            if view.original_struck {
                out.push_str(&format!(r#"<del class="review-original">{text}</del>"#));
            } else {
                out.push_str(&format!(r#"<div class="review-original">{text}</div>"#));
            }
        }
        if view.show_refined {
            out.push_str(&format!(
                r#"<div class="review-refined" contenteditable="{}">{}</div>"#,
                view.refined_editable,
                escape_html(&view.refined)
            ));
        }
        out.push_str("</div>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(decision: Decision) -> Finding {
        Finding {
            decision,
            ..Finding::new("f1", "Revenue grew 10%", "Revenue increased by 10%")
        }
    }

    #[test]
    fn view_follows_decision() {
        let pending = OverlayView::of(&finding(Decision::Pending));
        assert!(pending.show_original && pending.original_struck && pending.show_refined);

        let approved = OverlayView::of(&finding(Decision::Approved));
        assert!(!approved.show_original && approved.show_refined);

        let rejected = OverlayView::of(&finding(Decision::Rejected));
        assert!(rejected.show_original && !rejected.original_struck);
        assert!(!rejected.show_refined && !rejected.refined_editable);
    }

    #[test]
    fn static_renderer_strikes_original_and_exposes_editable_refined() {
        let html = StaticOverlayRenderer.render(&finding(Decision::Pending), MatchTier::Exact);
        assert!(html.contains(r#"data-finding-id="f1""#));
        assert!(html.contains(r#"data-match-tier="exact""#));
        assert!(html.contains(r#"<del class="review-original">Revenue grew 10%</del>"#));
        assert!(html.contains(
            r#"<div class="review-refined" contenteditable="true">Revenue increased by 10%</div>"#
        ));
    }

    #[test]
    fn static_renderer_hides_parts_by_decision() {
        let approved = StaticOverlayRenderer.render(&finding(Decision::Approved), MatchTier::Exact);
        assert!(!approved.contains("review-original"));
        let rejected = StaticOverlayRenderer.render(&finding(Decision::Rejected), MatchTier::Exact);
        assert!(!rejected.contains("review-refined"));
        assert!(!rejected.contains("<del"));
    }

    #[test]
    fn text_is_escaped() {
        let f = Finding::new("x\"y", "a < b", "c & d");
        let html = StaticOverlayRenderer.render(&f, MatchTier::Substring);
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("c &amp; d"));
        assert!(PlaceholderRenderer.render(&f, MatchTier::Substring).contains("x&quot;y"));
    }
}
