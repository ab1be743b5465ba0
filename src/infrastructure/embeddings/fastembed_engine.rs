use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use parking_lot::Mutex;
use tracing::info;

use crate::{application::services::EmbeddingEngine, domain::EmbeddingError};

/// Semantic embeddings for expert logs via `fastembed`.
///
/// Accepts either the full model code (`sentence-transformers/all-mpnet-base-v2`)
/// or the bare name expert tooling usually records (`all-mpnet-base-v2`).
pub struct FastEmbedEngine {
    model_label: String,
    dimensions: usize,
    inner: Mutex<TextEmbedding>,
}

/// A supported model matched from a user-facing name.
#[derive(Debug, Clone)]
struct ResolvedModel {
    model: EmbeddingModel,
    code: String,
    dimensions: usize,
}

fn resolve(name: &str) -> Result<ResolvedModel, EmbeddingError> {
    let wanted = name.trim();
    if wanted.is_empty() {
        return Err(EmbeddingError::Unavailable(
            "fastembed model name cannot be empty".into(),
        ));
    }

    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            let code = info.model_code.as_str();
            let short = code.rsplit('/').next().unwrap_or(code);
            code.eq_ignore_ascii_case(wanted) || short.eq_ignore_ascii_case(wanted)
        })
        .map(|info| ResolvedModel {
            model: info.model,
            code: info.model_code,
            dimensions: info.dim,
        })
        .ok_or_else(|| EmbeddingError::Unavailable(format!("unknown fastembed model `{wanted}`")))
}

impl FastEmbedEngine {
    /// Loads (downloading on first use) the named model.
    pub fn try_new(model_name: impl AsRef<str>) -> Result<Self, EmbeddingError> {
        let label = model_name.as_ref().trim().to_string();
        let resolved = resolve(&label)?;

        let text_embedding = TextEmbedding::try_new(TextInitOptions::new(resolved.model))
            .map_err(|err| {
                EmbeddingError::Unavailable(format!(
                    "failed to load fastembed model `{}`: {err}",
                    resolved.code
                ))
            })?;

        info!(model = %resolved.code, dimensions = resolved.dimensions, "fastembed model loaded");

        Ok(Self {
            model_label: label,
            dimensions: resolved.dimensions,
            inner: Mutex::new(text_embedding),
        })
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if !model.eq_ignore_ascii_case(&self.model_label) {
            return Err(EmbeddingError::ModelMismatch {
                expected: self.model_label.clone(),
                requested: model.to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::Inference("text payload cannot be empty".into()));
        }

        let vector = self
            .inner
            .lock()
            .embed(vec![text], None)
            .map_err(|err| EmbeddingError::Inference(err.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Inference("fastembed returned no embedding".into()))?;

        if vector.len() != self.dimensions {
            return Err(EmbeddingError::Inference(format!(
                "expected {} dimensions, model produced {}",
                self.dimensions,
                vector.len()
            )));
        }

        Ok(vector)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
