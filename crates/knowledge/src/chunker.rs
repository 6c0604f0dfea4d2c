//! Markdown-aware line chunking with token-budgeted overlap.
//!
//! Documents are split on line boundaries only. A line is never cut in the
//! middle, so a single line longer than the whole budget becomes its own
//! chunk. Chunking is deterministic: identical input always yields identical
//! chunks and chunk ids.

use crate::parser::MarkdownDocument;
use crate::types::{Chunk, ChunkParams};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Approximate number of characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Number of content characters mixed into a chunk id.
const ID_PREFIX_CHARS: usize = 100;

/// Length of a chunk id in hex characters.
const ID_HEX_LEN: usize = 16;

/// Splits markdown documents into overlapping, line-addressed chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    params: ChunkParams,
}

impl Chunker {
    /// Create a chunker with the given token budgets.
    pub fn new(params: ChunkParams) -> Self {
        Self { params }
    }

    /// The budgets this chunker was built with.
    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Chunk several documents, preserving document order.
    pub fn chunk_documents(&self, documents: &[MarkdownDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.chunk(&doc.path, &doc.content))
            .collect()
    }

    /// Chunk a document into ordered chunks.
    ///
    /// Empty documents produce no chunks.
    pub fn chunk(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let max_chars = self.params.target_tokens.max(1) * CHARS_PER_TOKEN;
        let overlap_chars = self.params.overlap_tokens * CHARS_PER_TOKEN;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut current_len = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let line_len = line_chars(line);

            if current_len + line_len > max_chars && idx > start {
                push_chunk(&mut chunks, file_path, &lines[start..idx], start);

                let (overlap_start, overlap_len) =
                    overlap_suffix(&lines, start, idx, overlap_chars);
                start = overlap_start;
                current_len = overlap_len;
            }

            current_len += line_len;
        }

        push_chunk(&mut chunks, file_path, &lines[start..], start);

        tracing::debug!(
            "Chunked {:?} into {} chunks (target: {} tokens, overlap: {} tokens)",
            file_path,
            chunks.len(),
            self.params.target_tokens,
            self.params.overlap_tokens
        );

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkParams::default())
    }
}

/// Length of a line including its newline.
fn line_chars(line: &str) -> usize {
    line.chars().count() + 1
}

/// Pick the suffix of `lines[start..end]` that seeds the next chunk.
///
/// Lines are taken backwards while they fit in `overlap_chars`. The suffix
/// never swallows the whole closed chunk. With a positive budget at least
/// the last line is carried whenever the closed chunk has two or more lines;
/// a single-line chunk carries nothing.
fn overlap_suffix(lines: &[&str], start: usize, end: usize, overlap_chars: usize) -> (usize, usize) {
    if overlap_chars == 0 || end - start < 2 {
        return (end, 0);
    }

    let mut overlap_start = end;
    let mut overlap_len = 0usize;

    while overlap_start > start + 1 {
        let candidate = line_chars(lines[overlap_start - 1]);
        if overlap_len + candidate > overlap_chars {
            break;
        }
        overlap_len += candidate;
        overlap_start -= 1;
    }

    if overlap_start == end {
        overlap_start = end - 1;
        overlap_len = line_chars(lines[overlap_start]);
    }

    (overlap_start, overlap_len)
}

fn push_chunk(chunks: &mut Vec<Chunk>, file_path: &Path, lines: &[&str], first_line: usize) {
    let content = lines.join("\n");
    if content.trim().is_empty() {
        return;
    }

    let line_start = first_line + 1;
    let line_end = first_line + lines.len();
    let char_count = content.chars().count();

    chunks.push(Chunk {
        chunk_id: chunk_id(file_path, line_start, line_end, &content),
        token_count: char_count.div_ceil(CHARS_PER_TOKEN),
        content,
        source_file: file_path.to_path_buf(),
        line_start,
        line_end,
    });
}

/// Compute the stable id of a chunk.
///
/// Collisions are accepted; ids are truncated SHA-256 digests.
pub fn chunk_id(file_path: &Path, line_start: usize, line_end: usize, content: &str) -> String {
    let prefix: String = content.chars().take(ID_PREFIX_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(b":");
    hasher.update(line_start.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(line_end.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(prefix.as_bytes());

    let digest = format!("{:x}", hasher.finalize());
    digest[..ID_HEX_LEN].to_string()
}
