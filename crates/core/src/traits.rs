use crate::{
    BulkItemOutcome, ContentQuery, IndexRecord, IngestError, SearchError, SearchHit, SourceItem,
};
use async_trait::async_trait;

/// Search engine boundary: bulk write, delete-by-query and match query
/// against a single index.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    fn index_name(&self) -> &str;

    async fn ensure_index(&self) -> Result<(), SearchError>;

    /// Upserts every record by id. The returned outcomes are positional: the
    /// i-th outcome belongs to the i-th record.
    async fn bulk_upsert(
        &self,
        records: &[IndexRecord],
    ) -> Result<Vec<BulkItemOutcome>, SearchError>;

    /// Deletes every document in the index and returns how many were removed.
    async fn delete_all(&self) -> Result<u64, SearchError>;

    async fn match_content(&self, query: &ContentQuery) -> Result<Vec<SearchHit>, SearchError>;
}

/// Read-only record store that lists documents to ingest.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn scan(&self) -> Result<Vec<SourceItem>, IngestError>;
}
