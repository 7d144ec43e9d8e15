use indexmap::IndexMap;

use shared::anchor::ContentAnchorEngine;
use shared::dto::{Decision, Finding, ProcessResponse};
use shared::matcher::MatchTier;
use shared::overlay::StaticOverlayRenderer;
use shared::session::ReviewSession;
use shared::tree::LeafScope;

const DOCUMENT: &str = "<h1>Audit</h1>\n<table><tr><td><p>Revenue grew 10%</p></td><td>Unrelated cell content</td></tr></table>\n<p>Closing remarks</p>";

fn response() -> ProcessResponse {
    let finding = Finding::new("f1", "Revenue grew 10%", "Revenue increased by 10%");
    ProcessResponse {
        document_html: DOCUMENT.to_string(),
        findings_map: IndexMap::from([(finding.id.clone(), finding)]),
    }
}

fn session() -> ReviewSession {
    ReviewSession::new(ContentAnchorEngine::default(), LeafScope::TableCells)
}

#[tokio::test]
async fn finding_is_overlaid_on_its_cell() -> anyhow::Result<()> {
    let session = session();
    let generation = session.load_document("audit.docx", response());
    let pass = session
        .wait_until_anchored(generation)
        .await
        .ok_or_else(|| anyhow::anyhow!("pass was not applied"))?;

    assert_eq!(pass.outcome.results.len(), 1);
    assert_eq!(pass.outcome.results[0].finding_id, "f1");
    assert_eq!(pass.outcome.results[0].tier, MatchTier::Exact);

    let rendered = session.render(&StaticOverlayRenderer)?;
    assert!(rendered.anchored);
    assert_eq!(rendered.placements.len(), 1);
    assert!(rendered
        .markup
        .contains(r#"<del class="review-original">Revenue grew 10%</del>"#));
    assert!(rendered.markup.contains(
        r#"<div class="review-refined" contenteditable="true">Revenue increased by 10%</div>"#
    ));
    // untouched regions keep their bytes
    assert!(rendered.markup.starts_with("<h1>Audit</h1>\n<table><tr><td><div"));
    assert!(rendered
        .markup
        .ends_with("</div></td><td>Unrelated cell content</td></tr></table>\n<p>Closing remarks</p>"));
    Ok(())
}

#[tokio::test]
async fn decisions_change_the_overlay_not_the_placement() -> anyhow::Result<()> {
    let session = session();
    let generation = session.load_document("audit.docx", response());
    session
        .wait_until_anchored(generation)
        .await
        .ok_or_else(|| anyhow::anyhow!("pass was not applied"))?;

    assert_eq!(session.approve("f1")?, Decision::Approved);
    let approved = session.render(&StaticOverlayRenderer)?;
    assert!(!approved.markup.contains("review-original"));
    assert!(approved.markup.contains("Revenue increased by 10%"));

    assert_eq!(session.reject("f1")?, Decision::Rejected);
    let rejected = session.render(&StaticOverlayRenderer)?;
    assert!(rejected
        .markup
        .contains(r#"<div class="review-original">Revenue grew 10%</div>"#));
    assert!(!rejected.markup.contains("review-refined"));
    assert_eq!(rejected.placements.len(), 1);

    session.reject("f1")?;
    session.edit("f1", "Revenue rose 10%")?;
    session.approve("f1")?;
    let request = session.export_request(None, Default::default())?;
    assert_eq!(request.export_filename, "refined_audit");
    assert_eq!(
        request.approved_findings.get("f1").map(String::as_str),
        Some("Revenue rose 10%")
    );
    Ok(())
}

#[tokio::test]
async fn unmatched_finding_stays_reviewable() -> anyhow::Result<()> {
    let session = session();
    let mut response = response();
    let stray = Finding::new("f2", "A sentence that appears nowhere", "Rewrite");
    response.findings_map.insert(stray.id.clone(), stray);

    let generation = session.load_document("audit.pdf", response);
    let pass = session
        .wait_until_anchored(generation)
        .await
        .ok_or_else(|| anyhow::anyhow!("pass was not applied"))?;

    assert_eq!(pass.outcome.summary.unmatched_findings, vec!["f2".to_string()]);
    assert_eq!(session.findings().len(), 2);
    assert_eq!(session.approve("f2")?, Decision::Approved);
    assert_eq!(session.progress().approved, 1);
    Ok(())
}
