use std::time::Duration;

use thiserror::Error;

/// Failures raised by an embedding engine.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The engine could not be reached or was never initialised.
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The caller asked for a model the engine was not built for.
    #[error("engine initialised for `{expected}` but `{requested}` requested")]
    ModelMismatch { expected: String, requested: String },

    /// The engine ran but failed to produce a vector.
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// Failures raised by a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("record codec error: {0}")]
    Codec(String),

    #[error("index backend error: {0}")]
    Backend(String),
}

/// Failures raised by the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("completion service returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("completion service transport error: {0}")]
    Transport(String),

    #[error("completion service sent an unusable reply: {0}")]
    InvalidResponse(String),
}

/// Domain-level errors shared across application components.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming payload missed a required field or violated invariants.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding error: {0}")]
    Embedding(#[source] EmbeddingError),

    /// The vector index failed while answering a query.
    #[error("search error: {0}")]
    Search(#[source] IndexError),

    /// The vector index rejected a write.
    #[error("store error: {0}")]
    Store(#[source] IndexError),

    #[error("upstream timeout: completion service did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream error: {0}")]
    Upstream(#[source] CompletionError),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn embedding(err: EmbeddingError) -> Self {
        Self::Embedding(err)
    }

    pub fn search(err: IndexError) -> Self {
        Self::Search(err)
    }

    pub fn store(err: IndexError) -> Self {
        Self::Store(err)
    }

    /// Maps a completion failure onto the chat-path taxonomy.
    pub fn upstream(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(limit) => Self::UpstreamTimeout(limit),
            other => Self::Upstream(other),
        }
    }

    /// True when the caller sent bad input rather than a dependency failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
