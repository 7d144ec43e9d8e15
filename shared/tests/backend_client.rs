use indexmap::IndexMap;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use serial_test::serial;
use shared::anchor::ContentAnchorEngine;
use shared::backend::{BackendClient, ReviewBackend};
use shared::dto::{Decision, ExportFormat, Finding, ProcessResponse};
use shared::error::AppError;
use shared::session::ReviewSession;
use shared::tree::LeafScope;
use tokio::runtime::Builder;

fn client(server: &MockServer) -> anyhow::Result<BackendClient> {
    Ok(BackendClient::new(
        &server.base_url(),
        &server.base_url(),
        Duration::from_secs(5),
    )?)
}

fn loaded_session() -> ReviewSession {
    let session = ReviewSession::new(ContentAnchorEngine::default(), LeafScope::TableCells);
    let finding = Finding::new("table_0_row_1_col_0", "Revenue grew 10%", "Revenue increased by 10%");
    session.load_document(
        "Audit Report.docx",
        ProcessResponse {
            document_html: "<table><tr><td>Revenue grew 10%</td></tr></table>".into(),
            findings_map: IndexMap::from([(finding.id.clone(), finding)]),
        },
    );
    session
}

#[serial]
#[test]
fn process_document_parses_findings() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/process-document")
                    .body_contains("audit.docx");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "document_html": "<table><tr><td>Revenue grew 10%</td></tr></table>",
                        "findings_map": {
                            "table_0_row_1_col_0": {
                                "id": "table_0_row_1_col_0",
                                "original": "Revenue grew 10%",
                                "refined": "Revenue increased by 10%",
                                "stage": 6,
                                "status": "done"
                            }
                        }
                    }));
            })
            .await;

        let backend = client(&server)?;
        let response = backend
            .process_document("audit.docx", b"PK fake docx".to_vec())
            .await?;
        mock.assert_async().await;

        let findings = response.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].refined, "Revenue increased by 10%");
        assert_eq!(findings[0].decision, Decision::Pending);
        Ok(())
    })
}

#[serial]
#[test]
fn upstream_failure_is_reported_and_session_kept() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/process-document");
                then.status(500).body("conversion crashed");
            })
            .await;

        let session = loaded_session();
        let backend = client(&server)?;
        let err = session
            .process_upload(&backend, "other.pdf", b"%PDF".to_vec())
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("upload should fail"))?;
        mock.assert_async().await;

        assert!(matches!(err, AppError::Upstream(msg) if msg.contains("500")));
        assert_eq!(session.filename().as_deref(), Some("Audit Report.docx"));
        assert_eq!(session.findings().len(), 1);
        Ok(())
    })
}

#[serial]
#[test]
fn unsupported_upload_never_reaches_upstream() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/process-document");
                then.status(200);
            })
            .await;

        let session = ReviewSession::new(ContentAnchorEngine::default(), LeafScope::TableCells);
        let backend = client(&server)?;
        let result = session
            .process_upload(&backend, "notes.txt", b"plain".to_vec())
            .await;
        assert!(matches!(result, Err(AppError::UnsupportedFormat(_))));
        assert_eq!(mock.hits_async().await, 0);
        Ok(())
    })
}

#[serial]
#[test]
fn export_sends_approved_findings() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/export-document").json_body(json!({
                    "original_filename": "Audit Report.docx",
                    "export_filename": "refined_Audit Report",
                    "export_format": "pdf",
                    "approved_findings": {
                        "table_0_row_1_col_0": "Revenue rose by 10%"
                    }
                }));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "download_url": "/download/refined_Audit Report.pdf",
                        "filename": "refined_Audit Report.pdf"
                    }));
            })
            .await;

        let session = loaded_session();
        session.edit("table_0_row_1_col_0", "Revenue rose by 10%")?;
        session.approve("table_0_row_1_col_0")?;

        let backend = client(&server)?;
        let artifact = session.export(&backend, None, ExportFormat::Pdf).await?;
        mock.assert_async().await;
        assert_eq!(artifact.filename, "refined_Audit Report.pdf");
        Ok(())
    })
}

#[serial]
#[test]
fn failed_export_leaves_decisions_untouched() -> anyhow::Result<()> {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::new)?;
    rt.block_on(async {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/export-document");
                then.status(503).body("busy");
            })
            .await;

        let session = loaded_session();
        session.approve("table_0_row_1_col_0")?;
        let before = session.findings();

        let backend = client(&server)?;
        let result = session
            .export(&backend, Some("custom"), ExportFormat::Docx)
            .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(session.findings(), before);
        assert_eq!(session.progress().approved, 1);
        Ok(())
    })
}
