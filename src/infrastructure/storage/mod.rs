//! Vector index adapters.
//!
//! `SledVectorIndex` is the durable default. `InMemoryVectorIndex` is the
//! fallback used when the on-disk index cannot be opened; it loses everything
//! on restart.

pub mod memory_index;
pub mod sled_index;

pub use memory_index::InMemoryVectorIndex;
pub use sled_index::SledVectorIndex;

use crate::domain::{IndexError, IndexHit, IndexedLog, LogEmbedding, LogFilter};

/// Cosine distance `1 - cos` in `[0, 2]`. A zero vector sits at distance 1.
pub(crate) fn cosine_distance(query: &[f32], candidate: &[f32]) -> Result<f32, IndexError> {
    if query.len() != candidate.len() {
        return Err(IndexError::DimensionMismatch {
            expected: candidate.len(),
            actual: query.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut q_norm = 0.0f32;
    let mut c_norm = 0.0f32;

    for (q, c) in query.iter().zip(candidate.iter()) {
        dot += q * c;
        q_norm += q * q;
        c_norm += c * c;
    }

    let denom = q_norm.sqrt() * c_norm.sqrt();
    if denom == 0.0 {
        return Ok(1.0);
    }

    Ok(1.0 - (dot / denom).clamp(-1.0, 1.0))
}

/// Scores filtered candidates and keeps the `top_k` closest, ascending by distance.
pub(crate) fn rank<I>(
    entries: I,
    embedding: &LogEmbedding,
    top_k: usize,
    filter: &LogFilter,
) -> Result<Vec<IndexHit>, IndexError>
where
    I: IntoIterator<Item = Result<IndexedLog, IndexError>>,
{
    let mut scored: Vec<IndexHit> = Vec::new();

    for entry in entries {
        let entry = entry?;
        if !filter.matches(&entry.record) {
            continue;
        }
        let distance = cosine_distance(&embedding.vector, &entry.embedding.vector)?;
        scored.push(IndexHit {
            record: entry.record,
            distance,
        });
    }

    // stable sort: equal distances keep storage order
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(top_k);

    Ok(scored)
}
