use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("failed to clear index: {0}")]
    Clear(#[source] SearchError),

    #[error("search index unavailable: {0}")]
    Index(#[source] SearchError),

    #[error("run {0} is still in progress")]
    RunInProgress(Uuid),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

/// Failure to turn one source item into text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported file format: {location}")]
    UnsupportedFormat { location: String },

    #[error("extraction failed for {location}: {cause}")]
    Failed { location: String, cause: String },
}

impl ExtractionError {
    pub fn failed(location: impl ToString, cause: impl ToString) -> Self {
        Self::Failed {
            location: location.to_string(),
            cause: cause.to_string(),
        }
    }
}
