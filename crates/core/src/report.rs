use crate::error::ExtractionError;
use crate::models::{IndexRecord, SourceItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    Indexing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    ExtractionFailed,
    BulkTransport,
    PerItemIndex,
}

impl FailureKind {
    pub fn stage(self) -> FailureStage {
        match self {
            Self::UnsupportedFormat | Self::ExtractionFailed => FailureStage::Extraction,
            Self::BulkTransport | Self::PerItemIndex => FailureStage::Indexing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub location: String,
    pub stage: FailureStage,
    pub kind: FailureKind,
    /// Status code reported by the search engine, when it answered.
    pub status: Option<u16>,
    pub reason: String,
}

impl ItemFailure {
    pub fn extraction(item: &SourceItem, error: &ExtractionError) -> Self {
        let (kind, reason) = match error {
            ExtractionError::UnsupportedFormat { .. } => {
                (FailureKind::UnsupportedFormat, error.to_string())
            }
            ExtractionError::Failed { cause, .. } => (FailureKind::ExtractionFailed, cause.clone()),
        };

        Self {
            id: item.id.clone(),
            location: item.location.to_string(),
            stage: kind.stage(),
            kind,
            status: None,
            reason,
        }
    }

    pub fn indexing(
        record: &IndexRecord,
        kind: FailureKind,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            location: record.location.clone(),
            stage: kind.stage(),
            kind,
            status,
            reason: reason.into(),
        }
    }
}

/// Outcome of submitting one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResult {
    pub indexed: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_seen: usize,
    pub extracted: usize,
    pub indexed_ids: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::start()
    }
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            items_seen: 0,
            extracted: 0,
            indexed_ids: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_seen(&mut self) {
        self.items_seen += 1;
    }

    pub fn record_extracted(&mut self) {
        self.extracted += 1;
    }

    pub fn record_extraction_failure(&mut self, item: &SourceItem, error: &ExtractionError) {
        self.failures.push(ItemFailure::extraction(item, error));
    }

    pub fn merge_bulk(&mut self, result: BulkResult) {
        self.indexed_ids.extend(result.indexed);
        self.failures.extend(result.failures);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn indexed(&self) -> usize {
        self.indexed_ids.len()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.kind == kind)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Items that have neither been indexed nor reported as failed.
    pub fn unaccounted(&self) -> usize {
        self.items_seen
            .saturating_sub(self.indexed() + self.failures.len())
    }
}
