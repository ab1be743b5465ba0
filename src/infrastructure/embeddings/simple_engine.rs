use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;

use crate::{application::services::EmbeddingEngine, domain::EmbeddingError};

// Fixed seeds keep vectors stable across restarts so persisted embeddings stay comparable.
const SEEDS: [u64; 4] = [
    0x6c69_6674_6b62_0001,
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
    0x94d0_49bb_1331_11eb,
];

/// A lightweight, deterministic embedding engine that hashes tokens into a fixed-size vector.
/// This is not meant for production-grade semantic search, but it keeps the service functional
/// without downloading external models or shipping native dependencies.
pub struct SimpleEmbedEngine {
    model_name: String,
    dimensions: usize,
    hasher: RandomState,
}

impl SimpleEmbedEngine {
    pub fn try_new(
        model_name: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        if dimensions == 0 {
            return Err(EmbeddingError::Unavailable(
                "embedding dimensions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            model_name: model_name.into(),
            dimensions: dimensions.clamp(8, 4096),
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        })
    }

    /// Infallible constructor; `dimensions` of zero is raised to the minimum of 8.
    pub fn new(model_name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimensions: dimensions.clamp(8, 4096),
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = self.hasher.build_hasher();
        token.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }

    fn embed_internal(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in Self::tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }

        // L2 normalize so cosine reduces to a dot product
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Default for SimpleEmbedEngine {
    fn default() -> Self {
        Self::new("liftkb/simple-hash", 384)
    }
}

impl EmbeddingEngine for SimpleEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if !model.eq_ignore_ascii_case(&self.model_name) {
            return Err(EmbeddingError::ModelMismatch {
                expected: self.model_name.clone(),
                requested: model.to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::Inference("text payload cannot be empty".into()));
        }
        Ok(self.embed_internal(text))
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic_and_normalized() {
        let engine = SimpleEmbedEngine::default();
        let a = engine.embed("liftkb/simple-hash", "Door sensor fault").unwrap();
        let b = SimpleEmbedEngine::default()
            .embed("liftkb/simple-hash", "door SENSOR fault")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn wrong_model_is_refused() {
        let engine = SimpleEmbedEngine::default();
        assert!(matches!(
            engine.embed("other-model", "text"),
            Err(EmbeddingError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn zero_dimensions_fail_fast() {
        assert!(SimpleEmbedEngine::try_new("m", 0).is_err());
        assert_eq!(SimpleEmbedEngine::new("m", 0).dims("m"), Some(8));
    }
}
