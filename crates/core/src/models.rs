use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_EXTRACTION_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Pdf,
    Docx,
    Unsupported,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Self {
        if extension.eq_ignore_ascii_case("pdf") {
            Self::Pdf
        } else if extension.eq_ignore_ascii_case("docx") {
            Self::Docx
        } else {
            Self::Unsupported
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unsupported)
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }
}

/// Where the bytes of a source item live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Remote(Url),
}

impl Location {
    /// Interprets `raw` as an `http(s)://` URL, a `file://` URL or a plain path.
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IngestError::InvalidArgument("empty location".to_string()));
        }

        if let Ok(url) = Url::parse(trimmed) {
            match url.scheme() {
                "http" | "https" => return Ok(Self::Remote(url)),
                "file" => {
                    return url.to_file_path().map(Self::File).map_err(|_| {
                        IngestError::InvalidArgument(format!("invalid file url: {trimmed}"))
                    })
                }
                // Windows drive letters parse as a one-letter scheme.
                _ => {}
            }
        }

        Ok(Self::File(PathBuf::from(trimmed)))
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            Self::File(path) => SourceFormat::from_path(path),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(|name| SourceFormat::from_path(Path::new(name)))
                .unwrap_or(SourceFormat::Unsupported),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub id: String,
    pub location: Location,
    pub format: SourceFormat,
}

impl SourceItem {
    pub fn new(id: impl Into<String>, location: Location) -> Self {
        let format = location.format();
        Self {
            id: id.into(),
            location,
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub id: String,
    pub location: String,
    pub text: String,
}

impl ExtractedDocument {
    pub fn into_record(self) -> IndexRecord {
        IndexRecord {
            id: self.id,
            location: self.location,
            content: self.text,
        }
    }
}

/// The body written to the search engine under `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: String,
    pub location: String,
    pub content: String,
}

/// One entry of a bulk response, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemOutcome {
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItemOutcome {
    pub fn accepted(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: Some(id.into()),
            status,
            error: None,
        }
    }

    pub fn rejected(id: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentQuery {
    pub text: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub batch_size: usize,
    pub extraction_workers: usize,
    pub extraction_timeout: Option<Duration>,
    pub bulk_timeout: Option<Duration>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            extraction_workers: DEFAULT_EXTRACTION_WORKERS,
            extraction_timeout: None,
            bulk_timeout: None,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.extraction_workers == 0 {
            return Err(IngestError::InvalidArgument(
                "extraction workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_derived_from_extension_case_insensitively() {
        assert_eq!(SourceFormat::from_path(Path::new("a.PDF")), SourceFormat::Pdf);
        assert_eq!(SourceFormat::from_path(Path::new("b.Docx")), SourceFormat::Docx);
        assert_eq!(
            SourceFormat::from_path(Path::new("c.txt")),
            SourceFormat::Unsupported
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("no_extension")),
            SourceFormat::Unsupported
        );
    }

    #[test]
    fn location_parsing_distinguishes_urls_and_paths() -> Result<(), Box<dyn std::error::Error>> {
        let remote = Location::parse("https://files.example.com/mail/report.docx?v=2")?;
        assert!(matches!(remote, Location::Remote(_)));
        assert_eq!(remote.format(), SourceFormat::Docx);

        let local = Location::parse("/srv/mail/attachment.pdf")?;
        assert_eq!(local, Location::File(PathBuf::from("/srv/mail/attachment.pdf")));
        assert_eq!(local.format(), SourceFormat::Pdf);

        assert!(Location::parse("   ").is_err());
        Ok(())
    }

    #[test]
    fn default_options_are_valid_and_zero_batch_is_rejected() {
        assert!(IngestionOptions::default().validate().is_ok());

        let options = IngestionOptions {
            batch_size: 0,
            ..IngestionOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
