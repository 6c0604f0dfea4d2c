//! Retrieval orchestrator.
//!
//! A [`KnowledgeBase`] picks its backend once, on first use. If an embedder
//! can be constructed and an index loaded or built, queries go to the vector
//! index; otherwise the instance answers from the keyword engine for the rest
//! of its life. A vector query that fails at runtime is answered by the
//! keyword engine for that call only.

use crate::chunker::Chunker;
use crate::config::{default_index_dir, KnowledgeBaseConfig};
use crate::context::{assemble_context, deduplicate};
use crate::embeddings::{create_embedder, Embedder};
use crate::fingerprint;
use crate::keyword::{unique_sources, KeywordEngine, KeywordSettings};
use crate::parser;
use crate::safety::{FormattedContext, SafetyLayer};
use crate::types::{BackendKind, BuildStats, Chunk, IndexMetadata, KnowledgeChunk};
use crate::vector_index::{VectorIndex, METADATA_FILE, SCHEMA_VERSION};
use lore_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// A source of ranked passages.
pub trait SearchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn search(
        &self,
        query: &str,
        max_results: usize,
        context_lines: usize,
    ) -> AppResult<Vec<KnowledgeChunk>>;
}

/// Vector index plus the similarity cutoff applied to its hits.
#[derive(Debug)]
pub struct VectorBackend {
    index: VectorIndex,
    similarity_threshold: f32,
}

impl VectorBackend {
    pub fn metadata(&self) -> Option<&IndexMetadata> {
        self.index.metadata()
    }
}

impl SearchBackend for VectorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn search(
        &self,
        query: &str,
        max_results: usize,
        _context_lines: usize,
    ) -> AppResult<Vec<KnowledgeChunk>> {
        Ok(self
            .index
            .search(query, max_results, self.similarity_threshold)?
            .iter()
            .map(|(chunk, similarity)| KnowledgeChunk::from_chunk(chunk, *similarity))
            .collect())
    }
}

impl SearchBackend for KeywordEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyword
    }

    fn search(
        &self,
        query: &str,
        max_results: usize,
        context_lines: usize,
    ) -> AppResult<Vec<KnowledgeChunk>> {
        Ok(KeywordEngine::search(self, query, max_results, context_lines))
    }
}

/// The backend chosen at first use.
#[derive(Debug)]
pub enum Backend {
    Vector(VectorBackend),
    Keyword(KeywordEngine),
}

impl Backend {
    fn as_search(&self) -> &dyn SearchBackend {
        match self {
            Self::Vector(vector) => vector,
            Self::Keyword(keyword) => keyword,
        }
    }
}

/// Query API over one knowledge directory.
#[derive(Debug)]
pub struct KnowledgeBase {
    knowledge_dir: PathBuf,
    domain: Option<String>,
    config: KnowledgeBaseConfig,
    embedder_override: Option<Arc<dyn Embedder>>,
    backend: OnceLock<Backend>,
    keyword_fallback: OnceLock<KeywordEngine>,
    safety: SafetyLayer,
}

impl KnowledgeBase {
    pub fn new(knowledge_dir: impl Into<PathBuf>, config: KnowledgeBaseConfig) -> Self {
        let safety = SafetyLayer::new(config.safety.clone());
        Self {
            knowledge_dir: knowledge_dir.into(),
            domain: None,
            config,
            embedder_override: None,
            backend: OnceLock::new(),
            keyword_fallback: OnceLock::new(),
            safety,
        }
    }

    /// Restrict the base to files whose path or stem contains `domain`.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.domain = Some(domain).filter(|d| !d.trim().is_empty());
        self
    }

    /// Use `embedder` instead of the configured provider.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder_override = Some(embedder);
        self
    }

    pub fn knowledge_dir(&self) -> &Path {
        &self.knowledge_dir
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    /// Directory holding the persisted index for this base.
    pub fn index_dir(&self) -> PathBuf {
        match &self.config.index_dir {
            Some(dir) => dir.clone(),
            None => default_index_dir(&self.knowledge_dir, self.domain()),
        }
    }

    /// Backend serving queries, initializing it if needed.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend().as_search().kind()
    }

    /// Metadata of the loaded index, when vector-backed.
    pub fn index_metadata(&self) -> Option<&IndexMetadata> {
        match self.backend() {
            Backend::Vector(vector) => vector.metadata(),
            Backend::Keyword(_) => None,
        }
    }

    fn backend(&self) -> &Backend {
        self.backend.get_or_init(|| self.initialize())
    }

    fn initialize(&self) -> Backend {
        let start = Instant::now();
        match self.initialize_vector() {
            Ok(vector) => {
                tracing::info!(
                    "Vector search ready for {:?} ({} chunks) in {:.2}s",
                    self.knowledge_dir,
                    vector.index.len(),
                    start.elapsed().as_secs_f64()
                );
                Backend::Vector(vector)
            }
            Err(e) => {
                tracing::warn!("Vector search unavailable, using keyword search: {}", e);
                Backend::Keyword(self.load_keyword_engine())
            }
        }
    }

    fn embedder(&self) -> AppResult<Arc<dyn Embedder>> {
        match &self.embedder_override {
            Some(embedder) => Ok(Arc::clone(embedder)),
            None => create_embedder(&self.config.embedding),
        }
    }

    fn current_chunks(&self) -> (usize, Vec<Chunk>) {
        let documents = parser::load_documents(&self.knowledge_dir, self.domain());
        let chunks = Chunker::new(self.config.chunk_params()).chunk_documents(&documents);
        (documents.len(), chunks)
    }

    fn initialize_vector(&self) -> AppResult<VectorBackend> {
        let embedder = self.embedder()?;
        let (_, chunks) = self.current_chunks();

        if chunks.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "No markdown content to index under {:?}",
                self.knowledge_dir
            )));
        }

        let index = match self.load_cached(&embedder, &chunks) {
            Some(index) => index,
            None => {
                let index_dir = self.index_dir();
                let mut index = VectorIndex::new(embedder);
                index.build(chunks, self.config.chunk_params())?;
                if let Err(e) = index.save(&index_dir) {
                    tracing::warn!("Failed to persist index to {:?}: {}", index_dir, e);
                }
                index
            }
        };

        Ok(VectorBackend {
            index,
            similarity_threshold: self.config.similarity_threshold,
        })
    }

    fn load_cached(&self, embedder: &Arc<dyn Embedder>, chunks: &[Chunk]) -> Option<VectorIndex> {
        let index_dir = self.index_dir();
        if !index_dir.join(METADATA_FILE).exists() {
            tracing::debug!("No cached index at {:?}", index_dir);
            return None;
        }

        let metadata = match VectorIndex::read_metadata(&index_dir) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached index: {}", e);
                return None;
            }
        };

        if let Err(reason) = self.check_reusable(&metadata, embedder.as_ref(), chunks) {
            tracing::info!("Rebuilding index at {:?}: {}", index_dir, reason);
            return None;
        }

        match VectorIndex::load(&index_dir, Some(Arc::clone(embedder))) {
            Ok(index) => {
                tracing::info!("Reusing cached index at {:?}", index_dir);
                Some(index)
            }
            Err(e) => {
                tracing::warn!("Cached index at {:?} is invalid: {}", index_dir, e);
                None
            }
        }
    }

    /// Decide whether a cached index still describes the current sources.
    fn check_reusable(
        &self,
        metadata: &IndexMetadata,
        embedder: &dyn Embedder,
        chunks: &[Chunk],
    ) -> Result<(), String> {
        if metadata.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "schema version {} != {}",
                metadata.schema_version, SCHEMA_VERSION
            ));
        }
        if metadata.model_name != embedder.model_name() {
            return Err(format!(
                "model '{}' != '{}'",
                metadata.model_name,
                embedder.model_name()
            ));
        }
        if embedder.embedding_dim() != 0 && metadata.embedding_dim != embedder.embedding_dim() {
            return Err(format!(
                "dimension {} != {}",
                metadata.embedding_dim,
                embedder.embedding_dim()
            ));
        }

        if !self.config.validate_fingerprint {
            return Ok(());
        }

        if metadata.chunk_params != self.config.chunk_params() {
            return Err("chunk parameters changed".to_string());
        }
        let source_files = fingerprint::source_files(chunks);
        if metadata.source_fingerprint != fingerprint::source_fingerprint(&source_files) {
            return Err("source file set changed".to_string());
        }
        if metadata.content_fingerprint != fingerprint::content_fingerprint(chunks) {
            return Err("source content changed".to_string());
        }
        Ok(())
    }

    fn load_keyword_engine(&self) -> KeywordEngine {
        KeywordEngine::load(&self.knowledge_dir, self.domain()).with_settings(KeywordSettings {
            context_lines: self.config.context_lines,
            context_max_results: self.config.context_max_results,
            dedup_threshold: self.config.dedup_threshold,
        })
    }

    fn keyword_fallback(&self) -> &KeywordEngine {
        match self.backend() {
            Backend::Keyword(engine) => engine,
            Backend::Vector(_) => self
                .keyword_fallback
                .get_or_init(|| self.load_keyword_engine()),
        }
    }

    fn log_latency(&self, operation: &str, start: Instant) {
        let elapsed = start.elapsed();
        if elapsed.as_millis() > u128::from(self.config.latency_budget_ms) {
            tracing::warn!(
                "{} took {}ms, over the {}ms budget",
                operation,
                elapsed.as_millis(),
                self.config.latency_budget_ms
            );
        } else {
            tracing::debug!("{} took {}ms", operation, elapsed.as_millis());
        }
    }

    /// Rank passages for `query`, best first. Never fails; an empty list
    /// means nothing matched.
    pub fn search(&self, query: &str, max_results: usize, context_lines: usize) -> Vec<KnowledgeChunk> {
        let start = Instant::now();
        let backend = self.backend().as_search();

        let results = match backend.search(query, max_results, context_lines) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(
                    "{} search failed, answering from keyword search: {}",
                    backend.kind().as_str(),
                    e
                );
                self.keyword_fallback()
                    .search(query, max_results, context_lines)
            }
        };

        self.log_latency("search", start);
        results
    }

    fn context_candidates(&self, query: &str) -> Vec<KnowledgeChunk> {
        let results = self.search(
            query,
            self.config.context_max_results,
            self.config.context_lines,
        );
        deduplicate(results, self.config.dedup_threshold)
    }

    /// Length-bounded context for `query`, or the no-results sentinel.
    pub fn get_context(&self, query: &str, max_length: usize) -> String {
        assemble_context(&self.context_candidates(query), max_length)
    }

    /// Sanitized, source-labeled context for handing to a language model.
    pub fn get_safe_context(&self, query: &str, max_length: usize) -> FormattedContext {
        let candidates: Vec<KnowledgeChunk> = self
            .context_candidates(query)
            .into_iter()
            .map(|mut chunk| {
                chunk.source_file =
                    PathBuf::from(parser::relative_path(&chunk.source_file, &self.knowledge_dir));
                chunk
            })
            .collect();

        self.safety
            .format_context(&candidates, max_length, self.config.safety.min_similarity)
    }

    /// Distinct source files behind the top results, relative to the knowledge directory.
    pub fn get_sources(&self, query: &str, max_results: usize) -> Vec<String> {
        let results = self.search(query, max_results, self.config.context_lines);
        unique_sources(&results, &self.knowledge_dir)
    }

    /// Every markdown file in scope, relative to the knowledge directory.
    pub fn list_all_files(&self) -> Vec<String> {
        parser::discover_markdown_files(&self.knowledge_dir, self.domain())
            .iter()
            .map(|path| parser::relative_path(path, &self.knowledge_dir))
            .collect()
    }

    /// Validate retrieved or external content with this base's safety settings.
    pub fn safety(&self) -> &SafetyLayer {
        &self.safety
    }

    /// Build and persist a fresh index regardless of any cached copy.
    ///
    /// This instance keeps serving from the backend it already chose; the
    /// new index is picked up by instances created afterwards.
    pub fn rebuild_index(&self) -> AppResult<BuildStats> {
        let start = Instant::now();
        let embedder = self.embedder()?;
        let (files_count, chunks) = self.current_chunks();

        if chunks.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "No markdown content to index under {:?}",
                self.knowledge_dir
            )));
        }

        let chunks_count = chunks.len();
        let mut index = VectorIndex::new(embedder);
        index.build(chunks, self.config.chunk_params())?;
        index.save(&self.index_dir())?;

        let embedding_dim = index.metadata().map(|m| m.embedding_dim).unwrap_or(0);

        Ok(BuildStats {
            files_count,
            chunks_count,
            embedding_dim,
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramEmbedder;
    use crate::embeddings::EmbeddingConfig;
    use crate::types::ChunkParams;
    use tempfile::TempDir;

    fn trigram_config() -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            embedding: EmbeddingConfig::trigram(128),
            similarity_threshold: 0.0,
            ..Default::default()
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        Chunker::default().chunk(Path::new("/kb/a.md"), "# A\nalpha text")
    }

    fn sample_metadata(chunks: &[Chunk]) -> IndexMetadata {
        let source_files = fingerprint::source_files(chunks);
        IndexMetadata {
            schema_version: SCHEMA_VERSION,
            model_name: "trigram-v1".to_string(),
            embedding_dim: 128,
            chunk_count: chunks.len(),
            chunk_params: ChunkParams::default(),
            source_fingerprint: fingerprint::source_fingerprint(&source_files),
            content_fingerprint: fingerprint::content_fingerprint(chunks),
            source_files,
            built_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_check_reusable_accepts_matching_metadata() {
        let kb = KnowledgeBase::new("/kb", trigram_config());
        let chunks = sample_chunks();
        let embedder = TrigramEmbedder::new(128);
        assert!(kb
            .check_reusable(&sample_metadata(&chunks), &embedder, &chunks)
            .is_ok());
    }

    #[test]
    fn test_check_reusable_rejects_mismatches() {
        let kb = KnowledgeBase::new("/kb", trigram_config());
        let chunks = sample_chunks();
        let embedder = TrigramEmbedder::new(128);

        let mut metadata = sample_metadata(&chunks);
        metadata.schema_version += 1;
        assert!(kb.check_reusable(&metadata, &embedder, &chunks).is_err());

        let mut metadata = sample_metadata(&chunks);
        metadata.model_name = "other-model".to_string();
        assert!(kb.check_reusable(&metadata, &embedder, &chunks).is_err());

        let mut metadata = sample_metadata(&chunks);
        metadata.embedding_dim = 64;
        assert!(kb.check_reusable(&metadata, &embedder, &chunks).is_err());

        let edited = Chunker::default().chunk(Path::new("/kb/a.md"), "# A\nbeta text");
        let metadata = sample_metadata(&chunks);
        assert_eq!(
            kb.check_reusable(&metadata, &embedder, &edited),
            Err("source content changed".to_string())
        );
    }

    #[test]
    fn test_check_reusable_fingerprint_disabled() {
        let config = KnowledgeBaseConfig {
            validate_fingerprint: false,
            ..trigram_config()
        };
        let kb = KnowledgeBase::new("/kb", config);
        let chunks = sample_chunks();
        let edited = Chunker::default().chunk(Path::new("/kb/b.md"), "other");
        let embedder = TrigramEmbedder::new(128);

        assert!(kb
            .check_reusable(&sample_metadata(&chunks), &embedder, &edited)
            .is_ok());
    }

    #[test]
    fn test_index_dir_defaults_under_knowledge_dir() {
        let kb = KnowledgeBase::new("/kb", trigram_config()).with_domain("IoT");
        assert_eq!(kb.index_dir(), PathBuf::from("/kb/.lore-index/iot"));

        let config = KnowledgeBaseConfig {
            index_dir: Some(PathBuf::from("/tmp/idx")),
            ..trigram_config()
        };
        assert_eq!(KnowledgeBase::new("/kb", config).index_dir(), PathBuf::from("/tmp/idx"));
    }

    #[test]
    fn test_blank_domain_is_ignored() {
        let kb = KnowledgeBase::new("/kb", trigram_config()).with_domain("  ");
        assert_eq!(kb.domain(), None);
    }

    #[test]
    fn test_rebuild_index_reports_stats() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.md"), "# A\nalpha text").unwrap();
        std::fs::write(temp.path().join("b.md"), "# B\nbeta text").unwrap();

        let kb = KnowledgeBase::new(temp.path(), trigram_config());
        let stats = kb.rebuild_index().unwrap();

        assert_eq!(stats.files_count, 2);
        assert_eq!(stats.chunks_count, 2);
        assert_eq!(stats.embedding_dim, 128);
        assert!(kb.index_dir().join(METADATA_FILE).exists());
    }

    #[test]
    fn test_rebuild_index_empty_directory_fails() {
        let temp = TempDir::new().unwrap();
        let kb = KnowledgeBase::new(temp.path(), trigram_config());
        let err = kb.rebuild_index().unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_rebuild_index_disabled_provider() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.md"), "# A\nalpha text").unwrap();
        let config = KnowledgeBaseConfig {
            embedding: EmbeddingConfig::disabled(),
            ..Default::default()
        };
        let err = KnowledgeBase::new(temp.path(), config)
            .rebuild_index()
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
