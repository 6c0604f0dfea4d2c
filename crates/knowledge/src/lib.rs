//! Local markdown knowledge retrieval.
//!
//! Answers natural-language queries against a directory of markdown files
//! with ranked, source-labeled passages. Vector search over chunk
//! embeddings is used when an embedder is available; keyword search takes
//! over otherwise. Retrieved text passes through a safety layer before it
//! is handed to a language model.

pub mod chunker;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod fingerprint;
pub mod keyword;
pub mod knowledge_base;
pub mod parser;
pub mod safety;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::Chunker;
pub use config::{load_config, save_config, KnowledgeBaseConfig};
pub use context::NO_RESULTS;
pub use embeddings::{create_embedder, Embedder, EmbeddingConfig};
pub use keyword::KeywordEngine;
pub use knowledge_base::{Backend, KnowledgeBase, SearchBackend};
pub use safety::{FormattedContext, SafetyConfig, SafetyLayer, ValidationReport};
pub use types::{BackendKind, BuildStats, Chunk, ChunkParams, IndexMetadata, KnowledgeChunk};
pub use vector_index::VectorIndex;
