use parking_lot::RwLock;

use crate::{
    application::services::VectorIndex,
    domain::{ExpertLogRecord, IndexError, IndexHit, IndexedLog, LogEmbedding, LogFilter},
};

use super::rank;

/// Non-persistent index kept entirely in process memory.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<IndexedLog>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn insert(&self, entry: &IndexedLog) -> Result<(), IndexError> {
        let mut entries = self.entries.write();

        if let Some(first) = entries.first() {
            if first.embedding.dims() != entry.embedding.dims() {
                return Err(IndexError::DimensionMismatch {
                    expected: first.embedding.dims(),
                    actual: entry.embedding.dims(),
                });
            }
        }

        entries.push(entry.clone());
        Ok(())
    }

    fn query(
        &self,
        embedding: &LogEmbedding,
        top_k: usize,
        filter: &LogFilter,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let entries = self.entries.read();
        rank(entries.iter().cloned().map(Ok), embedding, top_k, filter)
    }

    fn get(&self, filter: &LogFilter) -> Result<Vec<ExpertLogRecord>, IndexError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|entry| filter.matches(&entry.record))
            .map(|entry| entry.record.clone())
            .collect())
    }

    fn count(&self) -> Result<usize, IndexError> {
        Ok(self.entries.read().len())
    }

    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }
}
