use crate::batch::BatchAccumulator;
use crate::bulk::BulkIndexer;
use crate::error::{ExtractionError, IngestError};
use crate::extractor::ContentExtractor;
use crate::ingest::IngestSource;
use crate::lifecycle::IndexLifecycle;
use crate::models::{ExtractedDocument, IndexRecord, IngestionOptions, SourceItem};
use crate::report::RunReport;
use crate::traits::DocumentIndex;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Clearing,
    Extracting,
    Flushing,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Index on top of whatever the index already holds.
    #[default]
    Append,
    /// Clear the index first so documents removed from the source disappear.
    Rebuild,
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source: IngestSource,
    pub mode: RunMode,
}

impl IngestRequest {
    pub fn new(source: IngestSource, mode: RunMode) -> Self {
        Self { source, mode }
    }
}

/// Drives one ingestion run: enumerate, optionally clear, extract, batch and
/// bulk-submit, collecting every per-item outcome into a [`RunReport`].
pub struct IngestionOrchestrator {
    extractor: ContentExtractor,
    indexer: BulkIndexer,
    lifecycle: IndexLifecycle,
    options: IngestionOptions,
}

impl IngestionOrchestrator {
    pub fn new(index: Arc<dyn DocumentIndex>, options: IngestionOptions) -> Result<Self, IngestError> {
        let extractor = ContentExtractor::new(options.extraction_timeout);
        Self::with_extractor(index, extractor, options)
    }

    pub fn with_extractor(
        index: Arc<dyn DocumentIndex>,
        extractor: ContentExtractor,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        options.validate()?;

        Ok(Self {
            extractor,
            indexer: BulkIndexer::new(index.clone(), options.bulk_timeout),
            lifecycle: IndexLifecycle::new(index),
            options,
        })
    }

    pub fn lifecycle(&self) -> &IndexLifecycle {
        &self.lifecycle
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    pub async fn run(&self, request: &IngestRequest) -> Result<RunReport, IngestError> {
        self.run_observed(request, |_| {}).await
    }

    /// Like [`IngestionOrchestrator::run`], reporting every phase change to
    /// `on_phase`.
    ///
    /// Only failures before the first write abort the run: an unreadable
    /// source or a failed clear. The source is enumerated before clearing so
    /// a bad input never empties the index.
    #[instrument(skip_all, fields(index = %self.lifecycle.index_name(), mode = ?request.mode))]
    pub async fn run_observed<F>(
        &self,
        request: &IngestRequest,
        on_phase: F,
    ) -> Result<RunReport, IngestError>
    where
        F: Fn(RunPhase) + Send + Sync,
    {
        let mut report = RunReport::start();
        let mut accumulator = BatchAccumulator::new(self.options.batch_size)?;
        on_phase(RunPhase::Idle);

        let items = match request.source.enumerate().await {
            Ok(items) => items,
            Err(error) => {
                warn!(error = %error, "input source could not be enumerated");
                on_phase(RunPhase::Failed);
                return Err(error);
            }
        };
        info!(items = items.len(), "ingestion run started");

        if request.mode == RunMode::Rebuild {
            on_phase(RunPhase::Clearing);
            if let Err(error) = self.lifecycle.clear().await {
                on_phase(RunPhase::Failed);
                return Err(error);
            }
        }

        on_phase(RunPhase::Extracting);
        let mut extractions = stream::iter(items)
            .map(|item| async move {
                let outcome = self.extract(&item).await;
                (item, outcome)
            })
            .buffered(self.options.extraction_workers);

        while let Some((item, outcome)) = extractions.next().await {
            report.record_seen();
            match outcome {
                Ok(document) => {
                    report.record_extracted();
                    accumulator.add(document.into_record());
                    if let Some(batch) = accumulator.flush_if_full() {
                        self.flush(&batch, &mut report, &on_phase).await;
                    }
                }
                Err(error) => {
                    warn!(id = %item.id, error = %error, "skipping document");
                    report.record_extraction_failure(&item, &error);
                }
            }
        }

        if let Some(batch) = accumulator.flush_remainder() {
            self.flush(&batch, &mut report, &on_phase).await;
        }

        report.finish();
        on_phase(RunPhase::Completed);
        info!(
            seen = report.items_seen,
            extracted = report.extracted,
            indexed = report.indexed(),
            failed = report.failures.len(),
            "ingestion run completed"
        );

        Ok(report)
    }

    async fn extract(&self, item: &SourceItem) -> Result<ExtractedDocument, ExtractionError> {
        let text = self.extractor.extract(&item.location, item.format).await?;
        debug!(id = %item.id, chars = text.len(), "extracted document");

        Ok(ExtractedDocument {
            id: item.id.clone(),
            location: item.location.to_string(),
            text,
        })
    }

    async fn flush<F>(&self, batch: &[IndexRecord], report: &mut RunReport, on_phase: &F)
    where
        F: Fn(RunPhase) + Send + Sync,
    {
        on_phase(RunPhase::Flushing);
        let result = self.indexer.submit(batch).await;
        info!(
            submitted = batch.len(),
            indexed = result.indexed.len(),
            failed = result.failures.len(),
            "batch flushed"
        );
        report.merge_bulk(result);
        on_phase(RunPhase::Extracting);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FailureKind, FailureStage};
    use crate::stores::MemoryIndex;
    use crate::test_support::{docx_bytes, pdf_bytes};
    use parking_lot::Mutex;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn scenario_dir() -> Result<TempDir, std::io::Error> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), pdf_bytes(&["Monthly invoice attached"]))?;
        fs::write(dir.path().join("b.docx"), docx_bytes(&["Meeting notes", "Budget draft"]))?;
        fs::write(dir.path().join("c.txt"), b"plain text is not indexed")?;
        fs::write(dir.path().join("d.pdf"), b"%PDF-1.4\n%broken")?;
        Ok(dir)
    }

    fn orchestrator(index: &Arc<MemoryIndex>, batch_size: usize) -> IngestionOrchestrator {
        let options = IngestionOptions {
            batch_size,
            extraction_workers: 2,
            ..IngestionOptions::default()
        };
        IngestionOrchestrator::new(index.clone(), options).expect("options are valid")
    }

    fn directory(path: &Path, mode: RunMode) -> IngestRequest {
        IngestRequest::new(IngestSource::Directory(path.to_path_buf()), mode)
    }

    #[tokio::test]
    async fn mixed_directory_produces_expected_report() -> Result<(), Box<dyn std::error::Error>> {
        let dir = scenario_dir()?;
        let index = Arc::new(MemoryIndex::new("documents_index"));

        let report = orchestrator(&index, 1000)
            .run(&directory(dir.path(), RunMode::Append))
            .await?;

        assert_eq!(report.items_seen, 4);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.indexed_ids, vec!["a.pdf", "b.docx"]);
        assert_eq!(report.count(FailureKind::UnsupportedFormat), 1);
        assert_eq!(report.count(FailureKind::ExtractionFailed), 1);
        assert_eq!(report.unaccounted(), 0);
        assert!(!report.is_success());
        assert!(report.finished_at.is_some());

        let unsupported = report
            .failures
            .iter()
            .find(|failure| failure.kind == FailureKind::UnsupportedFormat)
            .expect("c.txt is reported");
        assert_eq!(unsupported.id, "c.txt");
        assert_eq!(unsupported.stage, FailureStage::Extraction);
        Ok(())
    }

    #[tokio::test]
    async fn rebuild_leaves_one_document_per_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), pdf_bytes(&["Monthly invoice attached"]))?;
        fs::write(dir.path().join("b.docx"), docx_bytes(&["Meeting notes"]))?;
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index
            .bulk_upsert(&[IndexRecord {
                id: "removed.pdf".to_string(),
                location: "/old/removed.pdf".to_string(),
                content: "stale".to_string(),
            }])
            .await?;

        let report = orchestrator(&index, 1000)
            .run(&directory(dir.path(), RunMode::Rebuild))
            .await?;

        assert!(report.is_success());
        assert_eq!(index.ids(), vec!["a.pdf", "b.docx"]);
        let pdf = index.get("a.pdf").expect("a.pdf is indexed");
        assert!(pdf.content.contains("Monthly invoice attached"));
        assert_eq!(pdf.location, dir.path().join("a.pdf").display().to_string());
        assert_eq!(
            index.get("b.docx").map(|doc| doc.content),
            Some("Meeting notes".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn rerunning_does_not_duplicate_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = scenario_dir()?;
        let index = Arc::new(MemoryIndex::new("documents_index"));
        let orchestrator = orchestrator(&index, 1);
        let request = directory(dir.path(), RunMode::Append);

        let first = orchestrator.run(&request).await?;
        let after_first = index.len();
        let second = orchestrator.run(&request).await?;

        assert_eq!(after_first, 2);
        assert_eq!(index.len(), after_first);
        assert_eq!(first.indexed_ids, second.indexed_ids);
        Ok(())
    }

    #[tokio::test]
    async fn failed_clear_aborts_before_extraction() -> Result<(), Box<dyn std::error::Error>> {
        let dir = scenario_dir()?;
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.set_offline(true);
        let phases = Mutex::new(Vec::new());

        let result = orchestrator(&index, 1000)
            .run_observed(&directory(dir.path(), RunMode::Rebuild), |phase| {
                phases.lock().push(phase)
            })
            .await;

        assert!(matches!(result, Err(IngestError::Clear(_))));
        assert_eq!(
            *phases.lock(),
            vec![RunPhase::Idle, RunPhase::Clearing, RunPhase::Failed]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_fails_without_clearing() -> Result<(), Box<dyn std::error::Error>> {
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index
            .bulk_upsert(&[IndexRecord {
                id: "keep.pdf".to_string(),
                location: "/in/keep.pdf".to_string(),
                content: "still here".to_string(),
            }])
            .await?;

        let result = orchestrator(&index, 1000)
            .run(&directory(Path::new("/definitely/not/a/folder"), RunMode::Rebuild))
            .await;

        assert!(result.is_err());
        assert_eq!(index.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn phases_alternate_between_extracting_and_flushing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["1.docx", "2.docx", "3.docx"] {
            fs::write(dir.path().join(name), docx_bytes(&[name]))?;
        }
        let index = Arc::new(MemoryIndex::new("documents_index"));
        let phases = Mutex::new(Vec::new());

        let report = orchestrator(&index, 2)
            .run_observed(&directory(dir.path(), RunMode::Append), |phase| {
                phases.lock().push(phase)
            })
            .await?;

        assert_eq!(report.indexed(), 3);
        assert_eq!(
            *phases.lock(),
            vec![
                RunPhase::Idle,
                RunPhase::Extracting,
                RunPhase::Flushing,
                RunPhase::Extracting,
                RunPhase::Flushing,
                RunPhase::Extracting,
                RunPhase::Completed,
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn indexing_failures_are_recorded_per_item() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for name in ["1.docx", "2.docx", "3.docx"] {
            fs::write(dir.path().join(name), docx_bytes(&[name]))?;
        }
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.reject_id("2.docx", 400, "document_parsing_exception: bad content");

        let report = orchestrator(&index, 1000)
            .run(&directory(dir.path(), RunMode::Append))
            .await?;

        assert_eq!(report.indexed_ids, vec!["1.docx", "3.docx"]);
        assert_eq!(report.count(FailureKind::PerItemIndex), 1);
        assert_eq!(report.failures[0].id, "2.docx");
        assert_eq!(report.failures[0].stage, FailureStage::Indexing);
        assert_eq!(report.unaccounted(), 0);
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn non_utf8_file_name_is_still_ingested() -> Result<(), Box<dyn std::error::Error>> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir()?;
        fs::write(
            dir.path().join(OsStr::from_bytes(b"bad\xff.pdf")),
            pdf_bytes(&["Scanned receipt"]),
        )?;
        fs::write(dir.path().join("good.docx"), docx_bytes(&["Meeting notes"]))?;
        let index = Arc::new(MemoryIndex::new("documents_index"));

        let report = orchestrator(&index, 1000)
            .run(&directory(dir.path(), RunMode::Append))
            .await?;

        assert!(report.is_success());
        assert_eq!(index.ids(), vec!["bad\u{fffd}.pdf", "good.docx"]);
        Ok(())
    }

    #[tokio::test]
    async fn offline_engine_fails_each_batch_but_completes_the_run(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = scenario_dir()?;
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.set_offline(true);

        let report = orchestrator(&index, 1)
            .run(&directory(dir.path(), RunMode::Append))
            .await?;

        assert_eq!(report.items_seen, 4);
        assert_eq!(report.indexed(), 0);
        assert_eq!(report.count(FailureKind::BulkTransport), 2);
        assert_eq!(report.unaccounted(), 0);
        Ok(())
    }
}
