//! Fingerprints used to decide whether a cached index is stale.

use crate::types::Chunk;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Hash of the sorted set of source file paths.
pub fn source_fingerprint(source_files: &BTreeSet<PathBuf>) -> String {
    let mut hasher = Sha256::new();
    for path in source_files {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Hash over every chunk id and content, in chunk order.
///
/// Chunking is deterministic, so re-chunking unchanged files reproduces
/// the same fingerprint while any edit to a file changes it.
pub fn content_fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.chunk_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(chunk.content.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Collect the distinct source files of a chunk list.
pub fn source_files(chunks: &[Chunk]) -> BTreeSet<PathBuf> {
    chunks.iter().map(|c| c.source_file.clone()).collect()
}
