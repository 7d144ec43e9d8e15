//! HTTP client for the document processor and the export service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{error, info};

use crate::dto::{ExportArtifact, ExportFormat, ExportRequest, ProcessResponse};
use crate::error::{AppError, Result};

/// The document formats the processor accepts.
pub fn document_format(filename: &str) -> Result<ExportFormat> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".docx") {
        Ok(ExportFormat::Docx)
    } else if lower.ends_with(".pdf") {
        Ok(ExportFormat::Pdf)
    } else {
        Err(AppError::UnsupportedFormat(filename.to_string()))
    }
}

fn mime_for(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        ExportFormat::Pdf => "application/pdf",
    }
}

#[async_trait]
pub trait ReviewBackend: Send + Sync {
    /// Convert a document and collect its findings.
    async fn process_document(&self, filename: &str, bytes: Vec<u8>) -> Result<ProcessResponse>;

    /// Write approved findings back into the original and return where the
    /// artifact can be fetched.
    async fn export_document(&self, request: &ExportRequest) -> Result<ExportArtifact>;
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    upstream_url: String,
    export_url: String,
}

impl BackendClient {
    pub fn new(upstream_url: &str, export_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            export_url: export_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self> {
        Self::new(
            &settings.upstream_url,
            settings.export_url(),
            settings.request_timeout(),
        )
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    error!(%status, %body, "{what} failed");
    Err(AppError::Upstream(format!("{what} returned {status}: {body}")))
}

#[async_trait]
impl ReviewBackend for BackendClient {
    async fn process_document(&self, filename: &str, bytes: Vec<u8>) -> Result<ProcessResponse> {
        let format = document_format(filename)?;
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_for(format))?;
        let form = Form::new().part("file", part);
        let url = format!("{}/process-document", self.upstream_url);
        info!(%url, file = %filename, "sending document for processing");
        let resp = self.client.post(&url).multipart(form).send().await?;
        let resp = check_status(resp, "process-document").await?;
        let parsed = resp.json::<ProcessResponse>().await?;
        info!(findings = parsed.findings_map.len(), "document processed");
        Ok(parsed)
    }

    async fn export_document(&self, request: &ExportRequest) -> Result<ExportArtifact> {
        let url = format!("{}/export-document", self.export_url);
        info!(
            %url,
            original = %request.original_filename,
            format = %request.export_format,
            approved = request.approved_findings.len(),
            "requesting export"
        );
        let resp = self.client.post(&url).json(request).send().await?;
        let resp = check_status(resp, "export-document").await?;
        Ok(resp.json::<ExportArtifact>().await?)
    }
}
