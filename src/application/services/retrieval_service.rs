use std::sync::Arc;

use tracing::info;

use crate::{
    application::dtos::{ResultView, SearchRequest, SearchResponse},
    domain::{DomainError, IndexHit, LogEmbedding, LogFilter},
};

use super::{EmbeddingEngine, QueryNormalizer, VectorIndex};

pub const DEFAULT_TOP_K: usize = 3;
pub const MAX_TOP_K: usize = 50;

/// Normalizes a query, embeds it and asks the index for the nearest expert logs.
pub struct RetrievalService {
    normalizer: QueryNormalizer,
    embedder: Arc<dyn EmbeddingEngine>,
    index: Arc<dyn VectorIndex>,
    embedding_model: String,
    default_top_k: usize,
}

impl RetrievalService {
    pub fn new(
        normalizer: QueryNormalizer,
        embedder: Arc<dyn EmbeddingEngine>,
        index: Arc<dyn VectorIndex>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            normalizer,
            embedder,
            index,
            embedding_model: embedding_model.into(),
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k.clamp(1, MAX_TOP_K);
        self
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse, DomainError> {
        if request.query.trim().is_empty() {
            return Err(DomainError::validation("query cannot be empty"));
        }

        let top_k = match request.top_k {
            Some(0) => return Err(DomainError::validation("top_k must be at least 1")),
            Some(k) => k.min(MAX_TOP_K),
            None => self.default_top_k,
        };

        let refined_query = self.normalizer.normalize(&request.query);

        let vector = self
            .embedder
            .embed(&self.embedding_model, &refined_query)
            .map_err(DomainError::embedding)?;
        let embedding = LogEmbedding::new(&self.embedding_model, vector);

        let filter = LogFilter::any().with_elevator(request.elevator_id.as_deref());

        let hits = self
            .index
            .query(&embedding, top_k, &filter)
            .map_err(DomainError::search)?;

        info!(
            refined_query = %refined_query,
            elevator_id = request.elevator_id.as_deref().unwrap_or("None"),
            hits = hits.len(),
            "knowledge search"
        );

        let results = hits
            .into_iter()
            .map(|hit| shape(hit, &refined_query))
            .collect();

        Ok(SearchResponse {
            query: request.query,
            refined_query,
            results,
        })
    }
}

fn shape(hit: IndexHit, refined_query: &str) -> ResultView {
    let IndexHit { record, distance } = hit;
    ResultView {
        elevator_id: record.elevator_id,
        problem: record.problem,
        cause: record.cause,
        steps: record.steps,
        expert_id: record.expert_id,
        distance: format!("{distance:.4}"),
        refined_query: refined_query.to_string(),
        full_document: record.document,
    }
}
