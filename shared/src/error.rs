use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("finding not found: {0}")]
    FindingNotFound(String),
    #[error("unsupported document format: {0} (expected .docx or .pdf)")]
    UnsupportedFormat(String),
    #[error("no document loaded")]
    NoDocument,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
