//! Embedder trait and factory.

use crate::embeddings::config::EmbeddingConfig;
use crate::embeddings::providers::{ollama::OllamaEmbedder, trigram::TrigramEmbedder};
use lore_core::{AppError, AppResult};
use std::sync::Arc;

/// Default dimension for the trigram embedder.
const TRIGRAM_DEFAULT_DIM: usize = 384;

/// Text to fixed-width vector.
///
/// Implementations return L2-normalized vectors so that Euclidean distance
/// is monotonic with cosine similarity. Construction failures surface as
/// [`AppError::EmbedderUnavailable`]; failures of an individual call surface
/// as [`AppError::Embedding`].
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier, recorded in index metadata
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn embedding_dim(&self) -> usize;

    /// Embed a batch of texts. An empty batch yields an empty result.
    fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text (convenience method).
    fn embed_one(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed(&[text.to_string()])?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Create an embedder based on configuration.
///
/// Any failure here means the vector backend must not be used at all.
pub fn create_embedder(config: &EmbeddingConfig) -> AppResult<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "trigram" => {
            let dimensions = if config.dimensions == 0 {
                TRIGRAM_DEFAULT_DIM
            } else {
                config.dimensions
            };
            Ok(Arc::new(TrigramEmbedder::new(dimensions)))
        }

        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),

        "none" | "disabled" => Err(AppError::EmbedderUnavailable(
            "Vector search disabled by configuration".to_string(),
        )),

        _ => Err(AppError::EmbedderUnavailable(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, trigram, none",
            config.provider
        ))),
    }
}
