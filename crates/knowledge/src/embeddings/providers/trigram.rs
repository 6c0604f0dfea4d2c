//! Trigram embedder using character trigram-based content-aware embeddings.

use crate::embeddings::provider::{normalize_l2, Embedder};
use lore_core::AppResult;
use std::collections::{BTreeMap, HashSet};

/// Words ignored when building trigram vectors.
const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Trigram-based embedder for local, offline operation.
///
/// Generates deterministic embeddings based on text content using
/// character trigrams and word frequencies. While not semantically
/// accurate like neural embedding models, it produces consistent,
/// content-dependent unit vectors suitable for development and offline use.
#[derive(Debug)]
pub struct TrigramEmbedder {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl TrigramEmbedder {
    /// Create a new trigram embedder with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Generate a trigram-based embedding for text.
    fn generate_trigram_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        let lower = text.to_lowercase();
        let cleaned: String = lower
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut word_freq: BTreeMap<&str, u32> = BTreeMap::new();
        for word in cleaned
            .split_whitespace()
            .filter(|w| !self.stop_words.contains(*w) && w.chars().count() > 2)
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        // Each word contributes its character trigrams plus one whole-word slot
        for (word, freq) in word_freq.iter() {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram_hash = window.iter().collect::<String>().bytes().fold(0u64, |acc, b| {
                    acc.wrapping_mul(37).wrapping_add(b as u64)
                });

                let dim_idx = (trigram_hash as usize) % self.dimensions;
                embedding[dim_idx] += (*freq as f32).sqrt();
            }

            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            let base_dim = (word_hash as usize) % self.dimensions;
            embedding[base_dim] += *freq as f32;
        }

        normalize_l2(&mut embedding);
        embedding
    }
}

impl Embedder for TrigramEmbedder {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn embedding_dim(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.generate_trigram_embedding(text))
            .collect())
    }
}
