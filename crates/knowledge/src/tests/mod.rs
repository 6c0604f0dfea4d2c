//! Scenario tests exercising the knowledge base end to end.

mod degradation;

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::EmbeddingConfig;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub(crate) const ZIGBEE_DOC: &str = "## Zigbee Protocol\nZigbee is a low-power mesh protocol.";
pub(crate) const PASTA_DOC: &str = "## Pasta\nBoil salted water and cook the noodles until tender.";

/// Write `(relative path, content)` pairs under `dir`.
pub(crate) fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Knowledge directory holding one zigbee and one unrelated document.
pub(crate) fn zigbee_corpus() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_files(
        temp.path(),
        &[("zigbee.md", ZIGBEE_DOC), ("pasta.md", PASTA_DOC)],
    );
    temp
}

/// Vector-backed config using the offline trigram embedder.
pub(crate) fn vector_config() -> KnowledgeBaseConfig {
    KnowledgeBaseConfig {
        embedding: EmbeddingConfig::trigram(256),
        similarity_threshold: 0.0,
        ..Default::default()
    }
}

/// Config with vector search disabled.
pub(crate) fn keyword_config() -> KnowledgeBaseConfig {
    KnowledgeBaseConfig {
        embedding: EmbeddingConfig::disabled(),
        ..Default::default()
    }
}
