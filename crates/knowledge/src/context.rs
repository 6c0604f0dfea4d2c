//! Deduplication and length-bounded context assembly.

use crate::types::KnowledgeChunk;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Returned by `get_context` when nothing matched.
pub const NO_RESULTS: &str = "No relevant knowledge found in knowledge base.";

/// Default Jaccard similarity above which two chunks count as duplicates.
pub const DEFAULT_DEDUP_THRESHOLD: f32 = 0.8;

const PREFERRED_MIN_LEN: usize = 200;
const PREFERRED_MAX_LEN: usize = 500;
const LENGTH_PENALTY: f32 = 0.1;

fn word_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Word-level Jaccard similarity of two texts.
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let a = word_set(a);
    let b = word_set(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f32 / union as f32
}

/// Drop near-duplicate chunks, keeping rank order.
///
/// A chunk is removed when its content is contained in another chunk, or when
/// it is more than `threshold` Jaccard-similar to a chunk already kept.
/// Among identical contents the first occurrence survives.
pub fn deduplicate(chunks: Vec<KnowledgeChunk>, threshold: f32) -> Vec<KnowledgeChunk> {
    let contained: Vec<bool> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            chunks.iter().enumerate().any(|(j, other)| {
                i != j
                    && other.content.contains(chunk.content.as_str())
                    && (other.content.len() > chunk.content.len() || j < i)
            })
        })
        .collect();

    let mut kept: Vec<KnowledgeChunk> = Vec::new();
    for (chunk, is_contained) in chunks.into_iter().zip(contained) {
        if is_contained {
            tracing::debug!(
                "Dropping chunk {}:{} contained in another result",
                chunk.source_file.display(),
                chunk.line_start
            );
            continue;
        }
        if kept
            .iter()
            .any(|k| jaccard_similarity(&k.content, &chunk.content) > threshold)
        {
            continue;
        }
        kept.push(chunk);
    }
    kept
}

/// Ranking key for context assembly: score, lightly penalized outside 200-500 chars.
pub fn context_priority(chunk: &KnowledgeChunk) -> f32 {
    let len = chunk.content.chars().count();
    let penalty = if len < PREFERRED_MIN_LEN {
        (PREFERRED_MIN_LEN - len) as f32 / PREFERRED_MIN_LEN as f32
    } else if len > PREFERRED_MAX_LEN {
        ((len - PREFERRED_MAX_LEN) as f32 / 1000.0).min(1.0)
    } else {
        0.0
    };
    chunk.score - LENGTH_PENALTY * penalty
}

/// Largest prefix of `text` that fits in `max_bytes` without splitting a char.
pub fn truncate_at_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Concatenate `[From: file] (score: s)` blocks up to `max_length` bytes.
///
/// One block per source file. When not even the best block fits, it is
/// truncated to the remaining budget. Returns [`NO_RESULTS`] for no chunks.
pub fn assemble_context(chunks: &[KnowledgeChunk], max_length: usize) -> String {
    if chunks.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut ordered: Vec<&KnowledgeChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| {
        context_priority(b)
            .partial_cmp(&context_priority(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut context = String::new();
    let mut seen: HashSet<&Path> = HashSet::new();

    for chunk in &ordered {
        if seen.contains(chunk.source_file.as_path()) {
            continue;
        }
        let block = format!(
            "[From: {}] (score: {:.2})\n{}\n",
            chunk.file_name(),
            chunk.score,
            chunk.content
        );
        if context.len() + block.len() > max_length {
            break;
        }
        context.push_str(&block);
        seen.insert(chunk.source_file.as_path());
    }

    if context.is_empty() {
        let first = ordered[0];
        let block = format!(
            "[From: {}] (score: {:.2})\n{}",
            first.file_name(),
            first.score,
            first.content
        );
        context.push_str(truncate_at_boundary(&block, max_length));
    }

    context.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(file: &str, content: &str, score: f32) -> KnowledgeChunk {
        KnowledgeChunk {
            content: content.to_string(),
            source_file: PathBuf::from(file),
            line_start: 1,
            line_end: 1,
            score,
        }
    }

    #[test]
    fn test_jaccard_similarity() {
        assert_eq!(jaccard_similarity("a b c", "a b c"), 1.0);
        assert_eq!(jaccard_similarity("a b", "c d"), 0.0);
        assert!((jaccard_similarity("a b c d", "a b c e") - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_dedup_removes_substring_chunk() {
        let chunks = vec![
            chunk("a.md", "Zigbee is a mesh protocol", 0.9),
            chunk("b.md", "## Zigbee\nZigbee is a mesh protocol\nwith low power", 0.8),
        ];
        let kept = deduplicate(chunks, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_file, PathBuf::from("b.md"));
    }

    #[test]
    fn test_dedup_keeps_first_of_identical() {
        let chunks = vec![
            chunk("a.md", "same text", 0.9),
            chunk("b.md", "same text", 0.5),
        ];
        let kept = deduplicate(chunks, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_file, PathBuf::from("a.md"));
    }

    #[test]
    fn test_dedup_jaccard_threshold() {
        let chunks = vec![
            chunk("a.md", "one two three four five six seven eight nine ten", 0.9),
            chunk("b.md", "one two three four five six seven eight nine eleven", 0.8),
            chunk("c.md", "completely different words here", 0.7),
        ];
        let kept = deduplicate(chunks, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].source_file, PathBuf::from("c.md"));
    }

    #[test]
    fn test_priority_prefers_moderate_length() {
        let short = chunk("a.md", "tiny", 0.5);
        let moderate = chunk("b.md", &"x".repeat(300), 0.5);
        assert!(context_priority(&moderate) > context_priority(&short));
    }

    #[test]
    fn test_assemble_empty_is_sentinel() {
        assert_eq!(assemble_context(&[], 1000), NO_RESULTS);
    }

    #[test]
    fn test_assemble_one_block_per_file() {
        let chunks = vec![
            chunk("/kb/zigbee.md", "first", 0.9),
            chunk("/kb/zigbee.md", "second", 0.8),
            chunk("/kb/wifi.md", "third", 0.7),
        ];
        let context = assemble_context(&chunks, 1000);
        assert!(context.starts_with("[From: zigbee.md] (score: 0.90)\nfirst"));
        assert!(!context.contains("second"));
        assert!(context.contains("[From: wifi.md] (score: 0.70)\nthird"));
    }

    #[test]
    fn test_assemble_stops_at_budget() {
        let chunks = vec![
            chunk("a.md", &"a".repeat(300), 0.9),
            chunk("b.md", &"b".repeat(300), 0.8),
        ];
        let context = assemble_context(&chunks, 400);
        assert!(context.contains(&"a".repeat(300)));
        assert!(!context.contains('b'.to_string().repeat(300).as_str()));
        assert!(context.len() <= 400);
    }

    #[test]
    fn test_assemble_truncates_when_nothing_fits() {
        let chunks = vec![chunk("a.md", &"é".repeat(500), 0.9)];
        let context = assemble_context(&chunks, 100);
        assert!(context.starts_with("[From: a.md]"));
        assert!(context.len() <= 100);
    }

    #[test]
    fn test_assemble_long_file_name_stays_within_budget() {
        let chunks = vec![chunk(
            "/kb/zigbee-coordinator-pairing-troubleshooting-guide.md",
            "Zigbee pairing steps.",
            1.0,
        )];
        for max_length in [0, 10, 20, 40] {
            let context = assemble_context(&chunks, max_length);
            assert!(context.len() <= max_length, "{} > {}", context.len(), max_length);
        }
    }

    #[test]
    fn test_truncate_at_boundary() {
        assert_eq!(truncate_at_boundary("hello", 10), "hello");
        assert_eq!(truncate_at_boundary("hello", 3), "hel");
        assert_eq!(truncate_at_boundary("éé", 3), "é");
    }
}
