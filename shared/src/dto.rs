//! Wire types shared with the document processor and the export service.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub type FindingId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FindingStatus {
    Processing,
    Done,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    /// Verbatim source text, may contain nested markup.
    pub original: String,
    pub refined: String,
    #[serde(default)]
    pub stage: u32,
    pub status: FindingStatus,
    #[serde(default)]
    pub decision: Decision,
}

impl Finding {
    pub fn new(id: impl Into<String>, original: impl Into<String>, refined: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original: original.into(),
            refined: refined.into(),
            stage: 0,
            status: FindingStatus::Done,
            decision: Decision::Pending,
        }
    }
}

/// Response of the document processor's `/process-document` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub document_html: String,
    /// Keeps the order the processor wrote; matching walks findings in it.
    pub findings_map: IndexMap<FindingId, Finding>,
}

impl ProcessResponse {
    /// Findings in wire order.
    pub fn findings(&self) -> Vec<Finding> {
        self.findings_map.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Docx,
    Pdf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportRequest {
    pub original_filename: String,
    pub export_filename: String,
    pub export_format: ExportFormat,
    pub approved_findings: BTreeMap<FindingId, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportArtifact {
    pub download_url: String,
    pub filename: String,
}
