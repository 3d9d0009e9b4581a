use crate::models::{BulkItemOutcome, ContentQuery, IndexRecord, SearchHit};
use crate::traits::DocumentIndex;
use crate::SearchError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// In-process index with upsert-by-id semantics.
///
/// Individual ids can be rejected and the whole store can be taken offline,
/// which mirrors the partial and transport failures of a real engine.
pub struct MemoryIndex {
    name: String,
    documents: RwLock<BTreeMap<String, IndexRecord>>,
    rejected: RwLock<HashMap<String, (u16, String)>>,
    offline: RwLock<bool>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
            rejected: RwLock::new(HashMap::new()),
            offline: RwLock::new(false),
        }
    }

    pub fn reject_id(&self, id: impl Into<String>, status: u16, reason: impl Into<String>) {
        self.rejected.write().insert(id.into(), (status, reason.into()));
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<IndexRecord> {
        self.documents.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    fn check_online(&self) -> Result<(), SearchError> {
        if *self.offline.read() {
            return Err(SearchError::NotReady(format!(
                "memory index {} is offline",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn ensure_index(&self) -> Result<(), SearchError> {
        self.check_online()
    }

    async fn bulk_upsert(
        &self,
        records: &[IndexRecord],
    ) -> Result<Vec<BulkItemOutcome>, SearchError> {
        self.check_online()?;

        let rejected = self.rejected.read();
        let mut documents = self.documents.write();
        let outcomes = records
            .iter()
            .map(|record| {
                if let Some((status, reason)) = rejected.get(&record.id) {
                    return BulkItemOutcome::rejected(&record.id, *status, reason);
                }
                let status = match documents.insert(record.id.clone(), record.clone()) {
                    Some(_) => 200,
                    None => 201,
                };
                BulkItemOutcome::accepted(&record.id, status)
            })
            .collect();

        Ok(outcomes)
    }

    async fn delete_all(&self) -> Result<u64, SearchError> {
        self.check_online()?;

        let mut documents = self.documents.write();
        let deleted = documents.len() as u64;
        documents.clear();
        Ok(deleted)
    }

    async fn match_content(&self, query: &ContentQuery) -> Result<Vec<SearchHit>, SearchError> {
        self.check_online()?;

        let needle = query.text.to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .documents
            .read()
            .values()
            .filter_map(|record| {
                let occurrences = record.content.to_lowercase().matches(&needle).count();
                (occurrences > 0).then(|| SearchHit {
                    id: record.id.clone(),
                    score: occurrences as f64,
                })
            })
            .collect();

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(query.max_results);
        Ok(hits)
    }
}
