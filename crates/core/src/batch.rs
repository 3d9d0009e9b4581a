use crate::error::IngestError;
use crate::models::IndexRecord;

/// Ordered buffer of records waiting for a bulk submission.
///
/// Back-pressure is cooperative: `add` never flushes on its own, the caller
/// checks [`BatchAccumulator::flush_if_full`] after every append.
#[derive(Debug)]
pub struct BatchAccumulator {
    threshold: usize,
    pending: Vec<IndexRecord>,
}

impl BatchAccumulator {
    pub fn new(threshold: usize) -> Result<Self, IngestError> {
        if threshold == 0 {
            return Err(IngestError::InvalidArgument(
                "batch threshold must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            threshold,
            pending: Vec::with_capacity(threshold),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.threshold
    }

    pub fn add(&mut self, record: IndexRecord) {
        self.pending.push(record);
    }

    pub fn flush_if_full(&mut self) -> Option<Vec<IndexRecord>> {
        if self.is_full() {
            Some(self.detach())
        } else {
            None
        }
    }

    pub fn flush_remainder(&mut self) -> Option<Vec<IndexRecord>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.detach())
        }
    }

    fn detach(&mut self) -> Vec<IndexRecord> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.threshold))
    }
}
