//! Dependency-free keyword search over in-memory markdown.
//!
//! Every query re-scans the loaded files: lines are scored against the query
//! keywords with markdown-structure boosts, nearby matching lines are merged
//! into runs, and each run is widened into a passage.

pub mod query;
pub mod scoring;

use crate::context::{assemble_context, deduplicate, DEFAULT_DEDUP_THRESHOLD};
use crate::parser::{self, MarkdownDocument};
use crate::types::KnowledgeChunk;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub use query::normalize_query;

/// Tunables for keyword retrieval and context assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordSettings {
    /// Lines of context around matches (also the run merge gap)
    pub context_lines: usize,
    /// Results considered when assembling context
    pub context_max_results: usize,
    /// Jaccard threshold for deduplication
    pub dedup_threshold: f32,
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            context_lines: 3,
            context_max_results: 10,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
        }
    }
}

/// Keyword engine owning one knowledge directory's file contents.
#[derive(Debug, Clone)]
pub struct KeywordEngine {
    knowledge_dir: PathBuf,
    files: BTreeMap<PathBuf, String>,
    settings: KeywordSettings,
}

struct ScoredPassage {
    chunk: KnowledgeChunk,
    line_score: f32,
}

impl KeywordEngine {
    /// Load every markdown file under `knowledge_dir`, optionally domain-filtered.
    pub fn load(knowledge_dir: &Path, domain: Option<&str>) -> Self {
        let documents = parser::load_documents(knowledge_dir, domain);
        let engine = Self::from_documents(knowledge_dir, documents);
        tracing::info!(
            "Keyword engine loaded {} files from {:?}",
            engine.files.len(),
            knowledge_dir
        );
        engine
    }

    /// Build an engine from already-loaded documents.
    pub fn from_documents(knowledge_dir: &Path, documents: Vec<MarkdownDocument>) -> Self {
        Self {
            knowledge_dir: knowledge_dir.to_path_buf(),
            files: documents
                .into_iter()
                .map(|doc| (doc.path, doc.content))
                .collect(),
            settings: KeywordSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: KeywordSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> KeywordSettings {
        self.settings
    }

    /// Number of loaded files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Rank passages for `query`, best first.
    pub fn search(&self, query: &str, max_results: usize, context_lines: usize) -> Vec<KnowledgeChunk> {
        let keywords = normalize_query(query);
        if keywords.is_empty() || max_results == 0 {
            return Vec::new();
        }

        let mut passages: Vec<ScoredPassage> = self
            .files
            .iter()
            .flat_map(|(path, content)| Self::score_file(path, content, &keywords, context_lines))
            .collect();

        passages.sort_by(|a, b| {
            b.chunk
                .score
                .partial_cmp(&a.chunk.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.line_score
                        .partial_cmp(&a.line_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        passages.truncate(max_results);

        tracing::debug!(
            "Keyword search for {:?} matched {} passages",
            keywords,
            passages.len()
        );

        passages.into_iter().map(|p| p.chunk).collect()
    }

    fn score_file(
        path: &Path,
        content: &str,
        keywords: &BTreeSet<String>,
        context_lines: usize,
    ) -> Vec<ScoredPassage> {
        let lines: Vec<&str> = content.lines().collect();

        let scored: Vec<(usize, f32)> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| (i, scoring::score_line(line, keywords)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        if scored.is_empty() {
            return Vec::new();
        }

        let indices: Vec<usize> = scored.iter().map(|(i, _)| *i).collect();

        scoring::group_runs(&indices, context_lines)
            .into_iter()
            .map(|run| {
                let (start, end) = scoring::expand_run(&lines, run, context_lines);
                let text = lines[start..=end].join("\n");
                let line_score = scored
                    .iter()
                    .filter(|(i, _)| (run.0..=run.1).contains(i))
                    .map(|(_, s)| s)
                    .sum();

                ScoredPassage {
                    chunk: KnowledgeChunk {
                        score: scoring::coverage_score(&text, keywords),
                        content: text,
                        source_file: path.to_path_buf(),
                        line_start: start + 1,
                        line_end: end + 1,
                    },
                    line_score,
                }
            })
            .collect()
    }

    /// Deduplicated, length-bounded context for `query`, or the no-results sentinel.
    pub fn get_context(&self, query: &str, max_length: usize) -> String {
        let results = self.search(
            query,
            self.settings.context_max_results,
            self.settings.context_lines,
        );
        let results = deduplicate(results, self.settings.dedup_threshold);
        assemble_context(&results, max_length)
    }

    /// Distinct relative paths of the files behind the top results.
    pub fn get_sources(&self, query: &str, max_results: usize) -> Vec<String> {
        let results = self.search(query, max_results, self.settings.context_lines);
        unique_sources(&results, &self.knowledge_dir)
    }

    /// Every loaded file, relative to the knowledge directory.
    pub fn list_all_files(&self) -> Vec<String> {
        self.files
            .keys()
            .map(|path| parser::relative_path(path, &self.knowledge_dir))
            .collect()
    }
}

/// Distinct source paths of ranked results, in rank order, relative to `base`.
pub fn unique_sources(results: &[KnowledgeChunk], base: &Path) -> Vec<String> {
    let mut seen = BTreeSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.source_file.clone()))
        .map(|r| parser::relative_path(&r.source_file, base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NO_RESULTS;

    fn doc(path: &str, content: &str) -> MarkdownDocument {
        MarkdownDocument {
            path: PathBuf::from(path),
            content: content.to_string(),
        }
    }

    fn engine() -> KeywordEngine {
        KeywordEngine::from_documents(
            Path::new("/kb"),
            vec![
                doc(
                    "/kb/protocols/zigbee.md",
                    "# Protocols\n\n## Zigbee Protocol\nZigbee is a low-power mesh protocol.\nIt runs on 2.4 GHz.\n",
                ),
                doc(
                    "/kb/recipes/bread.md",
                    "# Bread\nMix flour and water.\nBake for forty minutes.\n",
                ),
                doc(
                    "/kb/protocols/wifi.md",
                    "## Wi-Fi\nWi-Fi is not a mesh protocol by default.\n",
                ),
            ],
        )
    }

    #[test]
    fn test_search_ranks_best_coverage_first() {
        let results = engine().search("Zigbee protocol", 3, 3);

        assert!(!results.is_empty());
        assert!(results[0].content.to_lowercase().contains("zigbee"));
        assert_eq!(results[0].score, 1.0);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_search_line_numbers_one_indexed() {
        let results = engine().search("bake", 1, 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line_start, 3);
        assert_eq!(results[0].line_end, 3);
        assert_eq!(results[0].content, "Bake for forty minutes.");
    }

    #[test]
    fn test_search_snaps_to_header() {
        let results = engine().search("GHz", 1, 1);
        assert!(results[0].content.starts_with("## Zigbee Protocol"));
    }

    #[test]
    fn test_search_case_insensitive() {
        let engine = engine();
        let lower = engine.search("zigbee", 5, 3);
        let upper = engine.search("ZIGBEE", 5, 3);
        let mixed = engine.search("ZiGbEe", 5, 3);

        assert!(!lower.is_empty());
        assert_eq!(lower, upper);
        assert_eq!(lower, mixed);
    }

    #[test]
    fn test_search_no_keywords_or_matches() {
        let engine = engine();
        assert!(engine.search("the and of", 5, 3).is_empty());
        assert!(engine.search("kubernetes", 5, 3).is_empty());
        assert!(engine.search("zigbee", 0, 3).is_empty());
    }

    #[test]
    fn test_get_context_formats_blocks() {
        let context = engine().get_context("zigbee mesh", 2000);
        assert!(context.starts_with("[From: zigbee.md] (score: 1.00)"));
        assert!(context.contains("[From: wifi.md]"));
    }

    #[test]
    fn test_get_context_no_results_sentinel() {
        assert_eq!(engine().get_context("kubernetes", 1000), NO_RESULTS);
    }

    #[test]
    fn test_get_context_bounded() {
        let engine = engine();
        for max_length in [10, 40, 80, 200] {
            let context = engine.get_context("zigbee mesh protocol", max_length);
            assert!(context.len() <= max_length + 50, "{} > {}", context.len(), max_length);
        }
    }

    #[test]
    fn test_get_sources_relative_and_unique() {
        let sources = engine().get_sources("mesh protocol", 5);
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&"protocols/zigbee.md".to_string()));
        assert!(sources.contains(&"protocols/wifi.md".to_string()));
    }

    #[test]
    fn test_unique_sources_outside_base_is_absolute() {
        let results = vec![KnowledgeChunk {
            content: "x".to_string(),
            source_file: PathBuf::from("/elsewhere/x.md"),
            line_start: 1,
            line_end: 1,
            score: 1.0,
        }];
        assert_eq!(unique_sources(&results, Path::new("/kb")), vec!["/elsewhere/x.md"]);
    }

    #[test]
    fn test_list_all_files_sorted() {
        assert_eq!(
            engine().list_all_files(),
            vec!["protocols/wifi.md", "protocols/zigbee.md", "recipes/bread.md"]
        );
    }
}
