//! Service layer orchestrating domain operations and infrastructure adapters.

mod chat_orchestrator;
mod knowledge_store;
mod ports;
mod query_normalizer;
mod retrieval_service;

pub use chat_orchestrator::{
    latest_user_turn, ChatOrchestrator, DEFAULT_CHAT_TIMEOUT, SYSTEM_INSTRUCTION,
};
pub use knowledge_store::KnowledgeStore;
pub use ports::{CompletionBackend, EmbeddingEngine, VectorIndex};
pub use query_normalizer::{NormalizationRule, QueryNormalizer, Trigger, DEFAULT_RULES};
pub use retrieval_service::{RetrievalService, DEFAULT_TOP_K, MAX_TOP_K};
