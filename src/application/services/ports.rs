use std::time::Duration;

use crate::domain::{
    ChatMessage, CompletionError, EmbeddingError, ExpertLogRecord, IndexError, IndexHit,
    IndexedLog, LogEmbedding, LogFilter,
};

/// Abstraction over any embedding engine (hashed bag of words, FastEmbed, remote model).
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Contract for the nearest-neighbour store holding expert logs.
pub trait VectorIndex: Send + Sync {
    fn insert(&self, entry: &IndexedLog) -> Result<(), IndexError>;

    /// Returns at most `top_k` hits matching `filter`, ascending by distance.
    fn query(
        &self,
        embedding: &LogEmbedding,
        top_k: usize,
        filter: &LogFilter,
    ) -> Result<Vec<IndexHit>, IndexError>;

    fn get(&self, filter: &LogFilter) -> Result<Vec<ExpertLogRecord>, IndexError>;

    fn count(&self) -> Result<usize, IndexError>;

    fn flush(&self) -> Result<(), IndexError>;
}

/// Chat completion service; implementations must give up after `timeout`.
pub trait CompletionBackend: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> Result<String, CompletionError>;

    fn name(&self) -> &str;
}
