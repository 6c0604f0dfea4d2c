//! Embedding configuration types.

use serde::{Deserialize, Serialize};

/// Embedding configuration for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "ollama", "trigram", "none"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions (0 = adopt what the model reports)
    #[serde(default)]
    pub dimensions: usize,

    /// Whether to normalize embeddings to unit length
    #[serde(default = "default_normalize")]
    pub normalize: bool,

    /// Provider-specific configuration (JSON object)
    #[serde(default)]
    pub provider_config: serde_json::Value,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_normalize() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: 0,
            normalize: default_normalize(),
            provider_config: serde_json::json!({}),
        }
    }
}

impl EmbeddingConfig {
    /// Offline trigram configuration.
    pub fn trigram(dimensions: usize) -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions,
            ..Default::default()
        }
    }

    /// Configuration that disables vector search.
    pub fn disabled() -> Self {
        Self {
            provider: "none".to_string(),
            model: String::new(),
            ..Default::default()
        }
    }

    /// Read a string option from `provider_config`.
    pub fn provider_option(&self, key: &str) -> Option<&str> {
        self.provider_config.get(key).and_then(|v| v.as_str())
    }
}
