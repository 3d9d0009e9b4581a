pub mod batch;
pub mod bulk;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod records;
pub mod report;
pub mod runs;
pub mod search;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use batch::BatchAccumulator;
pub use bulk::BulkIndexer;
pub use error::{ExtractionError, IngestError, SearchError};
pub use extractor::{decode_bytes, ContentExtractor, DocxDecoder, LopdfDecoder, TextDecoder};
pub use ingest::{discover_source_items, IngestSource};
pub use lifecycle::IndexLifecycle;
pub use models::{
    BulkItemOutcome, ContentQuery, ExtractedDocument, IndexRecord, IngestionOptions, Location,
    SearchHit, SourceFormat, SourceItem, DEFAULT_BATCH_SIZE, DEFAULT_EXTRACTION_WORKERS,
};
pub use orchestrator::{IngestRequest, IngestionOrchestrator, RunMode, RunPhase};
pub use records::ManifestRecordSource;
pub use report::{BulkResult, FailureKind, FailureStage, ItemFailure, RunReport};
pub use runs::{RunKind, RunManager, RunStatus, DEFAULT_RUN_HISTORY};
pub use search::{SearchService, DEFAULT_MAX_RESULTS};
pub use stores::{MemoryIndex, OpenSearchStore};
pub use traits::{DocumentIndex, RecordSource};
