use crate::models::{BulkItemOutcome, IndexRecord};
use crate::report::{BulkResult, FailureKind, ItemFailure};
use crate::traits::DocumentIndex;
use crate::SearchError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Submits a batch as one bulk request and accounts for every record in it.
///
/// Failed items are reported, never retried: re-running ingestion is safe
/// because the engine upserts by id.
#[derive(Clone)]
pub struct BulkIndexer {
    index: Arc<dyn DocumentIndex>,
    timeout: Option<Duration>,
}

impl BulkIndexer {
    pub fn new(index: Arc<dyn DocumentIndex>, timeout: Option<Duration>) -> Self {
        Self { index, timeout }
    }

    #[instrument(skip(self, batch), fields(index = %self.index.index_name(), batch_len = batch.len()))]
    pub async fn submit(&self, batch: &[IndexRecord]) -> BulkResult {
        if batch.is_empty() {
            return BulkResult::default();
        }

        let request = self.index.bulk_upsert(batch);
        let response = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(response) => response,
                Err(_) => Err(SearchError::Request(format!(
                    "bulk request timed out after {limit:?}"
                ))),
            },
            None => request.await,
        };

        match response {
            Ok(outcomes) => reconcile(batch, &outcomes),
            Err(error) => {
                warn!(error = %error, "bulk request failed for the whole batch");
                let reason = error.to_string();
                BulkResult {
                    indexed: Vec::new(),
                    failures: batch
                        .iter()
                        .map(|record| {
                            ItemFailure::indexing(
                                record,
                                FailureKind::BulkTransport,
                                None,
                                reason.clone(),
                            )
                        })
                        .collect(),
                }
            }
        }
    }
}

/// Pairs the i-th outcome with the i-th record.
fn reconcile(batch: &[IndexRecord], outcomes: &[BulkItemOutcome]) -> BulkResult {
    if outcomes.len() != batch.len() {
        warn!(
            submitted = batch.len(),
            answered = outcomes.len(),
            "bulk response length does not match the batch"
        );
    }

    let mut result = BulkResult::default();
    for (position, record) in batch.iter().enumerate() {
        match outcomes.get(position) {
            Some(outcome) if outcome.is_success() => result.indexed.push(record.id.clone()),
            Some(outcome) => {
                if outcome.id.as_deref().is_some_and(|id| id != record.id) {
                    warn!(expected = %record.id, answered = ?outcome.id, "bulk response out of order");
                }
                let reason = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("engine answered with status {}", outcome.status));
                warn!(id = %record.id, status = outcome.status, reason = %reason, "document rejected");
                result.failures.push(ItemFailure::indexing(
                    record,
                    FailureKind::PerItemIndex,
                    Some(outcome.status),
                    reason,
                ));
            }
            None => result.failures.push(ItemFailure::indexing(
                record,
                FailureKind::PerItemIndex,
                None,
                "no entry for this document in the bulk response",
            )),
        }
    }

    debug!(
        indexed = result.indexed.len(),
        failed = result.failures.len(),
        "bulk batch reconciled"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentQuery, SearchHit};
    use crate::stores::MemoryIndex;
    use async_trait::async_trait;

    fn batch(size: usize) -> Vec<IndexRecord> {
        (0..size)
            .map(|index| IndexRecord {
                id: format!("file-{index}.pdf"),
                location: format!("/in/file-{index}.pdf"),
                content: format!("body {index}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn one_rejected_item_does_not_affect_the_others() {
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.reject_id("file-2.pdf", 400, "mapper_parsing_exception: failed to parse");
        let indexer = BulkIndexer::new(index.clone(), None);

        let result = indexer.submit(&batch(5)).await;

        assert_eq!(
            result.indexed,
            vec!["file-0.pdf", "file-1.pdf", "file-3.pdf", "file-4.pdf"]
        );
        assert_eq!(result.failures.len(), 1);
        let failure = &result.failures[0];
        assert_eq!(failure.id, "file-2.pdf");
        assert_eq!(failure.kind, FailureKind::PerItemIndex);
        assert_eq!(failure.status, Some(400));
        assert!(failure.reason.contains("mapper_parsing_exception"));
        assert_eq!(index.len(), 4);
    }

    #[tokio::test]
    async fn transport_failure_covers_the_whole_batch() {
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.set_offline(true);
        let indexer = BulkIndexer::new(index.clone(), None);

        let result = indexer.submit(&batch(3)).await;

        assert!(result.indexed.is_empty());
        assert_eq!(result.failures.len(), 3);
        assert!(result
            .failures
            .iter()
            .all(|failure| failure.kind == FailureKind::BulkTransport && failure.status.is_none()));
        assert!(index.is_empty());
    }

    #[test]
    fn short_response_marks_missing_entries_as_failed() {
        let records = batch(3);
        let outcomes = vec![
            BulkItemOutcome::accepted("file-0.pdf", 201),
            BulkItemOutcome::accepted("file-1.pdf", 200),
        ];

        let result = reconcile(&records, &outcomes);

        assert_eq!(result.indexed, vec!["file-0.pdf", "file-1.pdf"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].id, "file-2.pdf");
        assert_eq!(result.failures[0].status, None);
    }

    #[test]
    fn non_2xx_status_without_error_body_is_a_failure() {
        let records = batch(1);
        let outcomes = vec![BulkItemOutcome {
            id: Some("file-0.pdf".to_string()),
            status: 429,
            error: None,
        }];

        let result = reconcile(&records, &outcomes);

        assert!(result.indexed.is_empty());
        assert_eq!(result.failures[0].status, Some(429));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let index = Arc::new(MemoryIndex::new("documents_index"));
        index.set_offline(true);

        let result = BulkIndexer::new(index, None).submit(&[]).await;

        assert_eq!(result, BulkResult::default());
    }

    /// Engine that takes longer to answer a bulk request than the indexer waits.
    struct SlowIndex {
        delay: Duration,
    }

    #[async_trait]
    impl DocumentIndex for SlowIndex {
        fn index_name(&self) -> &str {
            "documents_index"
        }

        async fn ensure_index(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn bulk_upsert(
            &self,
            records: &[IndexRecord],
        ) -> Result<Vec<BulkItemOutcome>, SearchError> {
            tokio::time::sleep(self.delay).await;
            Ok(records
                .iter()
                .map(|record| BulkItemOutcome::accepted(&record.id, 201))
                .collect())
        }

        async fn delete_all(&self) -> Result<u64, SearchError> {
            Ok(0)
        }

        async fn match_content(&self, _query: &ContentQuery) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn timed_out_request_fails_every_item() {
        let index = Arc::new(SlowIndex {
            delay: Duration::from_secs(5),
        });
        let indexer = BulkIndexer::new(index, Some(Duration::from_millis(20)));

        let result = indexer.submit(&batch(3)).await;

        assert!(result.indexed.is_empty());
        assert_eq!(result.failures.len(), 3);
        assert!(result.failures.iter().all(|failure| {
            failure.kind == FailureKind::BulkTransport && failure.reason.contains("timed out")
        }));
    }

    #[tokio::test]
    async fn answer_within_the_timeout_is_reconciled() {
        let index = Arc::new(SlowIndex {
            delay: Duration::from_millis(1),
        });
        let indexer = BulkIndexer::new(index, Some(Duration::from_secs(5)));

        let result = indexer.submit(&batch(2)).await;

        assert_eq!(result.indexed, vec!["file-0.pdf", "file-1.pdf"]);
        assert!(result.failures.is_empty());
    }
}
