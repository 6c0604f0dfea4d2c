//! Knowledge base configuration management.

use crate::embeddings::EmbeddingConfig;
use crate::safety::SafetyConfig;
use crate::types::ChunkParams;
use lore_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tunables for chunking, retrieval and context assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks, in tokens
    pub chunk_overlap: usize,
    /// Default number of results returned by `search`
    pub top_k: usize,
    /// Minimum vector similarity for a result to be kept
    pub similarity_threshold: f32,
    /// Lines of context around keyword matches
    pub context_lines: usize,
    /// Maximum results considered when assembling context
    pub context_max_results: usize,
    /// Default context length budget in characters
    pub max_context_length: usize,
    /// Jaccard similarity above which two chunks are duplicates
    pub dedup_threshold: f32,
    /// Advisory query latency budget in milliseconds
    pub latency_budget_ms: u64,
    /// Re-hash current sources before trusting a cached index
    pub validate_fingerprint: bool,
    /// Override for the on-disk index directory
    pub index_dir: Option<PathBuf>,
    pub embedding: EmbeddingConfig,
    pub safety: SafetyConfig,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            top_k: 5,
            similarity_threshold: 0.3,
            context_lines: 3,
            context_max_results: 10,
            max_context_length: 4000,
            dedup_threshold: 0.8,
            latency_budget_ms: 2000,
            validate_fingerprint: true,
            index_dir: None,
            embedding: EmbeddingConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl KnowledgeBaseConfig {
    /// Chunking parameters derived from this config.
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            target_tokens: self.chunk_size,
            overlap_tokens: self.chunk_overlap,
        }
    }

    /// Reject settings that cannot produce sensible results.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(AppError::Config(format!(
                "dedup_threshold must be within [0, 1], got {}",
                self.dedup_threshold
            )));
        }
        Ok(())
    }
}

/// Load knowledge base configuration.
///
/// Loads from `.lore/knowledge.yaml` if it exists, otherwise returns the
/// default config.
pub fn load_config(workspace: &Path) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("Using default knowledge base config (no config file found)");
        return Ok(KnowledgeBaseConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Knowledge(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Knowledge(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    config.validate()?;

    tracing::debug!("Loaded knowledge base config from {:?}", config_path);
    Ok(config)
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Knowledge(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize config: {}", e)))?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Knowledge(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge base config to {:?}", config_path);
    Ok(())
}

/// Get the path to the knowledge config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".lore").join("knowledge.yaml")
}

/// Default on-disk index directory for a knowledge directory and domain.
pub fn default_index_dir(knowledge_dir: &Path, domain: Option<&str>) -> PathBuf {
    knowledge_dir
        .join(".lore-index")
        .join(domain.map(str::to_lowercase).unwrap_or_else(|| "all".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config, KnowledgeBaseConfig::default());
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.chunk_size, 512);
        assert!(config.validate_fingerprint);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeBaseConfig {
            chunk_size: 1024,
            top_k: 8,
            embedding: EmbeddingConfig::trigram(128),
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "top_k: 3\nembedding:\n  provider: trigram\n").unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding.provider, "trigram");
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.safety, SafetyConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = KnowledgeBaseConfig {
            chunk_overlap: 600,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = KnowledgeBaseConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_index_dir() {
        let dir = Path::new("/kb");
        assert_eq!(default_index_dir(dir, None), Path::new("/kb/.lore-index/all"));
        assert_eq!(
            default_index_dir(dir, Some("IoT")),
            Path::new("/kb/.lore-index/iot")
        );
    }

    #[test]
    fn test_chunk_params() {
        let config = KnowledgeBaseConfig::default();
        assert_eq!(config.chunk_params(), ChunkParams::default());
    }
}
