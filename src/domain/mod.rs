//! Domain layer: core entities and error taxonomy for the knowledge base.

pub mod errors;
pub mod models;

pub use errors::{CompletionError, DomainError, EmbeddingError, IndexError};
pub use models::{
    document_content, ChatMessage, ChatRole, ExpertLogRecord, FieldPredicate, IndexHit,
    IndexedLog, LogEmbedding, LogFilter, RecordSource,
};
