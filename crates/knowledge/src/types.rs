//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A line-addressed slice of a markdown document.
///
/// Chunks are produced by the chunker at index-build time and are never
/// mutated afterwards. Line numbers are 1-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub content: String,

    /// Markdown file the chunk was cut from
    pub source_file: PathBuf,

    /// First line covered (1-indexed)
    pub line_start: usize,

    /// Last line covered (1-indexed, inclusive)
    pub line_end: usize,

    /// Stable hash of path, line range and content prefix
    pub chunk_id: String,

    /// Rough token estimate (~4 characters per token)
    pub token_count: usize,
}

/// Token budgets used when chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkParams {
    /// Target chunk size in tokens
    pub target_tokens: usize,

    /// Overlap between consecutive chunks in tokens
    pub overlap_tokens: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            target_tokens: 512,
            overlap_tokens: 64,
        }
    }
}

/// Metadata persisted next to a vector index.
///
/// Written once per build and read back to decide whether a cached index
/// can be reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// On-disk schema version
    pub schema_version: u32,

    /// Embedding model that produced the vectors
    pub model_name: String,

    /// Embedding vector dimension
    pub embedding_dim: usize,

    /// Number of chunks (and vectors) in the index
    pub chunk_count: usize,

    /// Chunking budgets used at build time
    pub chunk_params: ChunkParams,

    /// Markdown files that contributed chunks
    pub source_files: BTreeSet<PathBuf>,

    /// Hash of the sorted source file paths
    pub source_fingerprint: String,

    /// Hash over every chunk id and content, in order
    #[serde(default)]
    pub content_fingerprint: String,

    /// When the index was built
    pub built_at: DateTime<Utc>,
}

/// A ranked retrieval result, independent of the backend that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Text content
    pub content: String,

    /// Markdown file the passage came from
    pub source_file: PathBuf,

    /// First line covered (1-indexed)
    pub line_start: usize,

    /// Last line covered (1-indexed, inclusive)
    pub line_end: usize,

    /// Relevance score in [0, 1]
    pub score: f32,
}

impl KnowledgeChunk {
    /// Convert a vector-index hit into the engine-agnostic result shape.
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            content: chunk.content.clone(),
            source_file: chunk.source_file.clone(),
            line_start: chunk.line_start,
            line_end: chunk.line_end,
            score: score.clamp(0.0, 1.0),
        }
    }

    /// File name used when labeling the passage.
    pub fn file_name(&self) -> String {
        self.source_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_file.to_string_lossy().to_string())
    }
}

/// Which backend serves queries for a knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedding-backed nearest-neighbor search
    Vector,
    /// Dependency-free keyword scoring
    Keyword,
}

impl BackendKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
        }
    }
}

/// Statistics from an index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStats {
    /// Number of markdown files chunked
    pub files_count: usize,

    /// Number of chunks embedded
    pub chunks_count: usize,

    /// Embedding dimension
    pub embedding_dim: usize,

    /// Duration in seconds
    pub duration_secs: f64,
}
