use crate::models::{ContentQuery, SearchHit};
use crate::traits::DocumentIndex;
use crate::SearchError;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_RESULTS: usize = 10_000;

#[derive(Clone)]
pub struct SearchService {
    index: Arc<dyn DocumentIndex>,
    max_results: usize,
}

impl SearchService {
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self {
            index,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Ids of documents whose content matches `text`, best match first.
    pub async fn search(&self, text: &str) -> Result<Vec<SearchHit>, SearchError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let hits = self
            .index
            .match_content(&ContentQuery {
                text: text.to_string(),
                max_results: self.max_results,
            })
            .await?;
        debug!(query = %text, hits = hits.len(), "search answered");

        Ok(hits)
    }
}
