//! One document under review: its rendered tree, the findings and their
//! decisions, and the match pass that anchors them.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::anchor::{apply_placements, AnchorSummary, ContentAnchorEngine, TracingDiagnostics};
use crate::backend::{document_format, ReviewBackend};
use crate::config::Settings;
use crate::decision::{Action, DecisionStore, ReviewProgress};
use crate::dto::{Decision, ExportArtifact, ExportFormat, ExportRequest, Finding, FindingId, ProcessResponse};
use crate::error::{AppError, Result};
use crate::matcher::MatchTier;
use crate::overlay::{OverlayRenderer, OverlayView};
use crate::schedule::{content_mount, AppliedPass, ContentMount, MatchPassScheduler, ReadySignal};
use crate::tree::{ContentTree, LeafLocator, LeafScope};

#[derive(Debug, Clone, Serialize)]
pub struct PlacementView {
    pub leaf_ordinal: usize,
    pub locator: LeafLocator,
    pub finding_id: FindingId,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub filename: String,
    pub generation: u64,
    /// False while the match pass for the current document has not finished.
    pub anchored: bool,
    pub markup: String,
    pub placements: Vec<PlacementView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnchorSummary>,
}

#[derive(Default)]
struct SessionState {
    filename: Option<String>,
    tree: Arc<ContentTree>,
    store: DecisionStore,
    generation: u64,
    ready: Option<ReadySignal>,
}

pub struct ReviewSession {
    scheduler: MatchPassScheduler,
    scope: LeafScope,
    state: RwLock<SessionState>,
}

/// `refined_<name without .docx/.pdf>`.
pub fn default_export_filename(original: &str) -> String {
    let lower = original.to_ascii_lowercase();
    let base = if lower.ends_with(".docx") {
        &original[..original.len() - 5]
    } else if lower.ends_with(".pdf") {
        &original[..original.len() - 4]
    } else {
        original
    };
    format!("refined_{base}")
}

impl ReviewSession {
    pub fn new(engine: ContentAnchorEngine, scope: LeafScope) -> Self {
        Self {
            scheduler: MatchPassScheduler::new(engine),
            scope,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let engine = ContentAnchorEngine::new(settings.match_policy())
            .with_diagnostics(Arc::new(TracingDiagnostics));
        Self::new(engine, settings.leaf_scope())
    }

    pub fn scheduler(&self) -> &MatchPassScheduler {
        &self.scheduler
    }

    /// Replace the document and its findings wholesale and schedule a fresh
    /// match pass. Returns the pass generation.
    pub fn load_document(&self, filename: impl Into<String>, response: ProcessResponse) -> u64 {
        // parsing materializes the whole tree before the pass is scheduled
        let (generation, mount) = self.load_document_deferred(filename, response);
        mount.settled();
        generation
    }

    /// Like [`load_document`](Self::load_document), but every pass over the
    /// new document waits until the returned mount settles.
    pub fn load_document_deferred(
        &self,
        filename: impl Into<String>,
        response: ProcessResponse,
    ) -> (u64, ContentMount) {
        let filename = filename.into();
        let findings = response.findings();
        let tree = Arc::new(ContentTree::parse(response.document_html, &self.scope));
        let (mount, ready) = content_mount();

        let mut state = self.state.write();
        state.store.load(findings);
        state.tree = tree.clone();
        state.filename = Some(filename.clone());
        state.ready = Some(ready.clone());
        let snapshot = Arc::new(state.store.findings().to_vec());
        let generation = self.scheduler.schedule(tree, snapshot, ready);
        state.generation = generation;
        info!(
            file = %filename,
            generation,
            leaves = state.tree.leaves().len(),
            findings = state.store.findings().len(),
            "document loaded"
        );
        (generation, mount)
    }

    /// Replace only the finding list, keeping the current document. The new
    /// pass supersedes any pending one and still waits for the document's
    /// mount.
    pub fn replace_findings(&self, findings: Vec<Finding>) -> Result<u64> {
        let mut state = self.state.write();
        if state.filename.is_none() {
            return Err(AppError::NoDocument);
        }
        state.store.load(findings);
        let snapshot = Arc::new(state.store.findings().to_vec());
        let ready = state.ready.clone().unwrap_or_else(ReadySignal::settled);
        let generation = self.scheduler.schedule(state.tree.clone(), snapshot, ready);
        state.generation = generation;
        info!(generation, findings = state.store.findings().len(), "findings replaced");
        Ok(generation)
    }

    /// Forward an upload to the processor and load the result. A failed
    /// upload leaves the current session untouched.
    pub async fn process_upload(
        &self,
        backend: &dyn ReviewBackend,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<u64> {
        document_format(filename)?;
        let response = backend.process_document(filename, bytes).await?;
        Ok(self.load_document(filename, response))
    }

    pub async fn wait_until_anchored(&self, generation: u64) -> Option<Arc<AppliedPass>> {
        self.scheduler.wait_for(generation).await
    }

    pub fn filename(&self) -> Option<String> {
        self.state.read().filename.clone()
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.state.read().store.findings().to_vec()
    }

    pub fn finding(&self, id: &str) -> Option<Finding> {
        self.state.read().store.get(id).cloned()
    }

    pub fn overlays(&self) -> Vec<OverlayView> {
        self.state
            .read()
            .store
            .findings()
            .iter()
            .map(OverlayView::of)
            .collect()
    }

    pub fn apply(&self, id: &str, action: Action) -> Result<Decision> {
        self.state.write().store.apply(id, action)
    }

    pub fn approve(&self, id: &str) -> Result<Decision> {
        self.apply(id, Action::Approve)
    }

    pub fn reject(&self, id: &str) -> Result<Decision> {
        self.apply(id, Action::Reject)
    }

    pub fn edit(&self, id: &str, text: impl Into<String>) -> Result<()> {
        self.state.write().store.edit(id, text)
    }

    pub fn progress(&self) -> ReviewProgress {
        self.state.read().store.progress()
    }

    /// The current document with overlays rendered from the latest applied
    /// pass and the current decisions. Before the pass lands the markup is
    /// returned as rendered.
    pub fn render(&self, renderer: &dyn OverlayRenderer) -> Result<RenderedDocument> {
        let state = self.state.read();
        let filename = state.filename.clone().ok_or(AppError::NoDocument)?;
        let pass = self
            .scheduler
            .latest()
            .filter(|pass| pass.generation == state.generation);

        let Some(pass) = pass else {
            return Ok(RenderedDocument {
                filename,
                generation: state.generation,
                anchored: false,
                markup: state.tree.markup().to_string(),
                placements: Vec::new(),
                summary: None,
            });
        };

        let markup = apply_placements(
            &pass.tree,
            &pass.outcome.placements,
            state.store.findings(),
            renderer,
        );
        let placements = pass
            .outcome
            .placements
            .iter()
            .map(|p| PlacementView {
                leaf_ordinal: p.leaf.ordinal,
                locator: p.leaf.locator.clone(),
                finding_id: p.finding_id.clone(),
                tier: p.tier,
            })
            .collect();
        Ok(RenderedDocument {
            filename,
            generation: pass.generation,
            anchored: true,
            markup,
            placements,
            summary: Some(pass.outcome.summary.clone()),
        })
    }

    pub fn export_request(
        &self,
        export_filename: Option<&str>,
        format: ExportFormat,
    ) -> Result<ExportRequest> {
        let state = self.state.read();
        let original = state.filename.clone().ok_or(AppError::NoDocument)?;
        let export_filename = export_filename
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_export_filename(&original));
        Ok(ExportRequest {
            original_filename: original,
            export_filename,
            export_format: format,
            approved_findings: state.store.export_payload(),
        })
    }

    /// Send approved findings to the export service. Review state is only
    /// read, so a failed export changes nothing.
    pub async fn export(
        &self,
        backend: &dyn ReviewBackend,
        export_filename: Option<&str>,
        format: ExportFormat,
    ) -> Result<ExportArtifact> {
        let request = self.export_request(export_filename, format)?;
        match backend.export_document(&request).await {
            Ok(artifact) => {
                info!(file = %artifact.filename, "export ready");
                Ok(artifact)
            }
            Err(e) => {
                warn!(error = %e, "export failed");
                Err(e)
            }
        }
    }
}
