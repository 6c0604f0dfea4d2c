//! Flat nearest-neighbor index over chunk embeddings.
//!
//! The index is persisted as three sibling artifacts in one directory:
//! the raw vectors (`index.flat`), the chunk store (`chunks.json`) and the
//! metadata (`metadata.json`). Metadata is small and is read first so that
//! compatibility can be checked before the large payloads are touched.

use crate::embeddings::{normalize_l2, Embedder};
use crate::fingerprint;
use crate::types::{Chunk, ChunkParams, IndexMetadata};
use chrono::Utc;
use lore_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Version of the on-disk layout. Indexes written with another version are rebuilt.
pub const SCHEMA_VERSION: u32 = 1;

/// File holding the raw vectors.
pub const INDEX_FILE: &str = "index.flat";

/// File holding the serialized chunks.
pub const CHUNKS_FILE: &str = "chunks.json";

/// File holding the index metadata.
pub const METADATA_FILE: &str = "metadata.json";

const INDEX_MAGIC: &[u8; 4] = b"LFL2";
const INDEX_HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Convert a Euclidean distance between unit vectors into a similarity.
///
/// For unit vectors `|a - b|^2 = 2 - 2cos`, so `1 - d^2/2` is the cosine,
/// clamped to [0, 1].
pub fn similarity_from_distance(distance: f32) -> f32 {
    (1.0 - distance * distance / 2.0).clamp(0.0, 1.0)
}

/// Exhaustive Euclidean-distance index stored row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Create an empty index for vectors of `dim` components.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors; each must have exactly `dim` components.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> AppResult<()> {
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dim {
                return Err(AppError::Embedding(format!(
                    "Vector {} has {} dimensions, index expects {}",
                    i,
                    vector.len(),
                    self.dim
                )));
            }
        }
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Return up to `k` `(position, distance)` pairs, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dim || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(pos, row)| {
                let squared: f32 = row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (pos, squared.sqrt())
            })
            .collect();

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    /// Serialize to the `index.flat` byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(INDEX_HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for &value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Parse the `index.flat` byte layout.
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() < INDEX_HEADER_LEN || &bytes[..4] != INDEX_MAGIC {
            return Err(AppError::IndexInvalid(
                "Vector file has no valid header".to_string(),
            ));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SCHEMA_VERSION {
            return Err(AppError::IndexInvalid(format!(
                "Vector file version {} does not match {}",
                version, SCHEMA_VERSION
            )));
        }

        let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = usize::try_from(u64::from_le_bytes(count_bytes)).map_err(|_| {
            AppError::IndexInvalid("Vector file count does not fit in memory".to_string())
        })?;

        let expected = dim.checked_mul(count).ok_or_else(|| {
            AppError::IndexInvalid(format!(
                "Vector file header is corrupt: {} vectors of dimension {}",
                count, dim
            ))
        })?;

        let payload = &bytes[INDEX_HEADER_LEN..];
        if payload.len() % 4 != 0 || payload.len() / 4 != expected {
            return Err(AppError::IndexInvalid(format!(
                "Vector file is truncated: expected {} values, found {} bytes",
                expected,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dim, data })
    }
}

/// Vector index over chunk embeddings plus the chunks and their metadata.
#[derive(Debug)]
pub struct VectorIndex {
    embedder: Option<Arc<dyn Embedder>>,
    index: FlatL2Index,
    chunks: Vec<Chunk>,
    metadata: Option<IndexMetadata>,
}

impl VectorIndex {
    /// Create an empty index that embeds with `embedder`.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder: Some(embedder),
            index: FlatL2Index::default(),
            chunks: Vec::new(),
            metadata: None,
        }
    }

    /// Embed every chunk in one batch and build the index.
    ///
    /// # Errors
    /// * `AppError::InvalidInput` - If `chunks` is empty or no embedder is configured
    /// * `AppError::Embedding` - If the embedding call fails
    pub fn build(&mut self, chunks: Vec<Chunk>, params: ChunkParams) -> AppResult<()> {
        let embedder = self
            .embedder
            .clone()
            .ok_or_else(|| AppError::InvalidInput("No embedder configured".to_string()))?;

        if chunks.is_empty() {
            return Err(AppError::InvalidInput(
                "Cannot build an index from zero chunks".to_string(),
            ));
        }

        let start = Instant::now();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut embeddings = embedder.embed(&texts)?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dim = embeddings.first().map(Vec::len).unwrap_or(0);
        if dim == 0 {
            return Err(AppError::Embedding(
                "Embedder returned empty vectors".to_string(),
            ));
        }

        for embedding in &mut embeddings {
            normalize_l2(embedding);
        }

        let mut index = FlatL2Index::new(dim);
        index.add(&embeddings)?;

        let source_files = fingerprint::source_files(&chunks);
        let metadata = IndexMetadata {
            schema_version: SCHEMA_VERSION,
            model_name: embedder.model_name().to_string(),
            embedding_dim: dim,
            chunk_count: chunks.len(),
            chunk_params: params,
            source_fingerprint: fingerprint::source_fingerprint(&source_files),
            content_fingerprint: fingerprint::content_fingerprint(&chunks),
            source_files,
            built_at: Utc::now(),
        };

        tracing::info!(
            "Built vector index: {} chunks from {} files, dim {}, model '{}' in {:.2}s",
            metadata.chunk_count,
            metadata.source_files.len(),
            dim,
            metadata.model_name,
            start.elapsed().as_secs_f64()
        );

        self.index = index;
        self.chunks = chunks;
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Find the chunks most similar to `query`.
    ///
    /// Results below `similarity_threshold` are dropped; the rest are sorted
    /// by similarity, highest first. An empty index yields no results.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f32,
    ) -> AppResult<Vec<(Chunk, f32)>> {
        if self.chunks.is_empty() || self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("No embedder configured".to_string()))?;

        let mut query_embedding = embedder.embed_one(query)?;
        if query_embedding.len() != self.index.dim() {
            return Err(AppError::Embedding(format!(
                "Query embedding has {} dimensions, index expects {}",
                query_embedding.len(),
                self.index.dim()
            )));
        }
        normalize_l2(&mut query_embedding);

        let mut results: Vec<(Chunk, f32)> = self
            .index
            .search(&query_embedding, top_k)
            .into_iter()
            .filter_map(|(pos, distance)| {
                let similarity = similarity_from_distance(distance);
                if similarity < similarity_threshold {
                    return None;
                }
                self.chunks.get(pos).map(|c| (c.clone(), similarity))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        tracing::debug!(
            "Vector search returned {} results (top-{}, threshold {:.2})",
            results.len(),
            top_k,
            similarity_threshold
        );

        Ok(results)
    }

    /// Persist the index, chunks and metadata into `dir`.
    ///
    /// Artifacts are written into a staging directory that then replaces
    /// `dir` wholesale. Concurrent writers are not coordinated: the last
    /// one to swap its directory in wins.
    pub fn save(&self, dir: &Path) -> AppResult<()> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("Cannot save an index that was never built".to_string()))?;

        let staging = staging_dir(dir);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        fs::write(staging.join(INDEX_FILE), self.index.to_bytes())?;
        fs::write(staging.join(CHUNKS_FILE), serde_json::to_vec(&self.chunks)?)?;
        fs::write(
            staging.join(METADATA_FILE),
            serde_json::to_vec_pretty(metadata)?,
        )?;

        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&staging, dir)?;

        tracing::info!("Saved vector index ({} chunks) to {:?}", self.chunks.len(), dir);
        Ok(())
    }

    /// Read only the metadata of a persisted index.
    pub fn read_metadata(dir: &Path) -> AppResult<IndexMetadata> {
        let path = dir.join(METADATA_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            AppError::IndexInvalid(format!("Cannot read metadata at {:?}: {}", path, e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::IndexInvalid(format!("Corrupt metadata at {:?}: {}", path, e))
        })
    }

    /// Load a persisted index.
    ///
    /// The metadata schema version must match [`SCHEMA_VERSION`] and the
    /// three artifacts must agree on chunk count and dimension; otherwise
    /// the index is reported invalid and must be rebuilt.
    pub fn load(dir: &Path, embedder: Option<Arc<dyn Embedder>>) -> AppResult<Self> {
        let metadata = Self::read_metadata(dir)?;

        if metadata.schema_version != SCHEMA_VERSION {
            return Err(AppError::IndexInvalid(format!(
                "Index schema version {} does not match {}",
                metadata.schema_version, SCHEMA_VERSION
            )));
        }

        let index_bytes = fs::read(dir.join(INDEX_FILE))
            .map_err(|e| AppError::IndexInvalid(format!("Cannot read vectors: {}", e)))?;
        let index = FlatL2Index::from_bytes(&index_bytes)?;

        let chunk_bytes = fs::read(dir.join(CHUNKS_FILE))
            .map_err(|e| AppError::IndexInvalid(format!("Cannot read chunks: {}", e)))?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&chunk_bytes)
            .map_err(|e| AppError::IndexInvalid(format!("Corrupt chunk store: {}", e)))?;

        if chunks.len() != metadata.chunk_count || index.len() != metadata.chunk_count {
            return Err(AppError::IndexInvalid(format!(
                "Artifact mismatch: metadata says {} chunks, store has {}, index has {}",
                metadata.chunk_count,
                chunks.len(),
                index.len()
            )));
        }

        if index.dim() != metadata.embedding_dim {
            return Err(AppError::IndexInvalid(format!(
                "Artifact mismatch: metadata dim {}, index dim {}",
                metadata.embedding_dim,
                index.dim()
            )));
        }

        tracing::debug!(
            "Loaded vector index from {:?}: {} chunks, dim {}",
            dir,
            chunks.len(),
            index.dim()
        );

        Ok(Self {
            embedder,
            index,
            chunks,
            metadata: Some(metadata),
        })
    }

    /// Metadata recorded at build time.
    pub fn metadata(&self) -> Option<&IndexMetadata> {
        self.metadata.as_ref()
    }

    /// Indexed chunks, in index order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!(".{}.staging-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::embeddings::providers::trigram::TrigramEmbedder;
    use tempfile::TempDir;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(TrigramEmbedder::new(256))
    }

    fn corpus_chunks() -> Vec<Chunk> {
        let chunker = Chunker::default();
        let mut chunks = chunker.chunk(
            Path::new("/kb/zigbee.md"),
            "## Zigbee Protocol\nZigbee is a low-power mesh protocol.",
        );
        chunks.extend(chunker.chunk(
            Path::new("/kb/bread.md"),
            "## Sourdough\nBake the loaf at high heat with steam.",
        ));
        chunks.extend(chunker.chunk(
            Path::new("/kb/wifi.md"),
            "## Wi-Fi\nWi-Fi uses a star topology around an access point.",
        ));
        chunks
    }

    fn built_index() -> VectorIndex {
        let mut index = VectorIndex::new(embedder());
        index.build(corpus_chunks(), ChunkParams::default()).unwrap();
        index
    }

    #[test]
    fn test_similarity_from_distance() {
        assert!((similarity_from_distance(0.0) - 1.0).abs() < 1e-6);
        assert!((similarity_from_distance(std::f32::consts::SQRT_2)).abs() < 1e-6);
        assert_eq!(similarity_from_distance(2.0), 0.0);
    }

    #[test]
    fn test_flat_index_nearest_first() {
        let mut index = FlatL2Index::new(2);
        index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7071, 0.7071]])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn test_flat_index_rejects_wrong_dimension() {
        let mut index = FlatL2Index::new(3);
        assert!(index.add(&[vec![1.0, 0.0]]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_flat_index_bytes_reject_truncation() {
        let mut index = FlatL2Index::new(2);
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let bytes = index.to_bytes();

        assert_eq!(FlatL2Index::from_bytes(&bytes).unwrap(), index);
        assert!(FlatL2Index::from_bytes(&bytes[..bytes.len() - 2]).is_err());
        assert!(FlatL2Index::from_bytes(b"nope").is_err());
    }

    fn header(dim: u32, count: u64) -> Vec<u8> {
        let mut bytes = INDEX_MAGIC.to_vec();
        bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&dim.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes
    }

    #[test]
    fn test_flat_index_bytes_reject_oversized_count() {
        let mut bytes = header(256, u64::MAX);
        bytes.extend_from_slice(&1.0f32.to_le_bytes());

        let err = FlatL2Index::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, AppError::IndexInvalid(_)));
    }

    #[test]
    fn test_build_requires_chunks() {
        let mut index = VectorIndex::new(embedder());
        let err = index.build(Vec::new(), ChunkParams::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_build_records_metadata() {
        let index = built_index();
        let metadata = index.metadata().unwrap();

        assert_eq!(metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(metadata.model_name, "trigram-v1");
        assert_eq!(metadata.embedding_dim, 256);
        assert_eq!(metadata.chunk_count, 3);
        assert_eq!(metadata.source_files.len(), 3);
        assert_eq!(metadata.chunk_params, ChunkParams::default());
        assert_eq!(metadata.source_fingerprint.len(), 64);
    }

    #[test]
    fn test_search_ranks_relevant_chunk_first() {
        let index = built_index();
        let results = index.search("zigbee mesh protocol", 3, 0.0).unwrap();

        assert!(!results.is_empty());
        assert!(results[0].0.content.contains("Zigbee"));
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_search_scores_in_unit_range() {
        let index = built_index();
        for query in ["zigbee", "sourdough bread", "access point", "", "!!!"] {
            for (_, score) in index.search(query, 10, 0.0).unwrap() {
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }

    #[test]
    fn test_search_threshold_filters() {
        let index = built_index();
        let all = index.search("zigbee mesh protocol", 3, 0.0).unwrap();
        let strict = index.search("zigbee mesh protocol", 3, 0.99).unwrap();
        assert!(strict.len() < all.len());
    }

    #[test]
    fn test_search_respects_top_k() {
        let index = built_index();
        assert_eq!(index.search("protocol", 1, 0.0).unwrap().len(), 1);
        assert!(index.search("protocol", 0, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new(embedder());
        assert!(index.search("zigbee", 5, 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        let index = built_index();
        index.save(&dir).unwrap();

        assert!(dir.join(INDEX_FILE).exists());
        assert!(dir.join(CHUNKS_FILE).exists());
        assert!(dir.join(METADATA_FILE).exists());

        let loaded = VectorIndex::load(&dir, Some(embedder())).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.metadata(), index.metadata());

        let before = index.search("zigbee mesh", 1, 0.0).unwrap();
        let after = loaded.search("zigbee mesh", 1, 0.0).unwrap();
        assert_eq!(before[0].0.chunk_id, after[0].0.chunk_id);
    }

    #[test]
    fn test_save_replaces_existing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.txt"), "old").unwrap();

        built_index().save(&dir).unwrap();

        assert!(!dir.join("stale.txt").exists());
        assert!(dir.join(METADATA_FILE).exists());
    }

    #[test]
    fn test_save_unbuilt_index_fails() {
        let temp = TempDir::new().unwrap();
        let index = VectorIndex::new(embedder());
        assert!(index.save(&temp.path().join("index")).is_err());
    }

    #[test]
    fn test_load_rejects_schema_mismatch() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        built_index().save(&dir).unwrap();

        let mut metadata = VectorIndex::read_metadata(&dir).unwrap();
        metadata.schema_version = SCHEMA_VERSION + 1;
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_vec(&metadata).unwrap(),
        )
        .unwrap();

        let err = VectorIndex::load(&dir, Some(embedder())).unwrap_err();
        assert!(matches!(err, AppError::IndexInvalid(_)));
    }

    #[test]
    fn test_load_rejects_artifact_mismatch() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        built_index().save(&dir).unwrap();

        fs::write(dir.join(CHUNKS_FILE), "[]").unwrap();

        let err = VectorIndex::load(&dir, Some(embedder())).unwrap_err();
        assert!(matches!(err, AppError::IndexInvalid(_)));
    }

    #[test]
    fn test_load_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = VectorIndex::load(&temp.path().join("absent"), None).unwrap_err();
        assert!(matches!(err, AppError::IndexInvalid(_)));
    }

    #[test]
    fn test_loaded_index_without_embedder_cannot_search() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        built_index().save(&dir).unwrap();

        let loaded = VectorIndex::load(&dir, None).unwrap();
        assert!(loaded.search("zigbee", 3, 0.0).is_err());
    }
}
