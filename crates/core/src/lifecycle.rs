use crate::error::IngestError;
use crate::traits::DocumentIndex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Owns the clear-and-rebuild operations of one index.
#[derive(Clone)]
pub struct IndexLifecycle {
    index: Arc<dyn DocumentIndex>,
}

impl IndexLifecycle {
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self { index }
    }

    pub fn index_name(&self) -> &str {
        self.index.index_name()
    }

    /// Removes every document. Clearing an empty or missing index succeeds.
    #[instrument(skip(self), fields(index = %self.index.index_name()))]
    pub async fn clear(&self) -> Result<u64, IngestError> {
        match self.index.delete_all().await {
            Ok(deleted) => {
                info!(deleted, "index cleared");
                Ok(deleted)
            }
            Err(error) => {
                warn!(error = %error, "index clear failed");
                Err(IngestError::Clear(error))
            }
        }
    }

    pub async fn ensure_index(&self) -> Result<(), IngestError> {
        self.index.ensure_index().await.map_err(IngestError::Index)
    }
}
