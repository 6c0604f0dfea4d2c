//! Query normalization for keyword search.

use std::collections::BTreeSet;

/// Words that carry no retrieval signal.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "his",
    "was", "one", "our", "out", "has", "have", "what", "how", "when", "where", "which", "who",
    "why", "with", "this", "that", "from", "they", "will", "would", "there", "their", "about",
    "into", "does", "should", "could", "been", "being", "some", "than", "then", "them", "these",
    "those", "your", "also", "use", "using", "get", "tell", "explain", "describe",
];

/// Turn a free-text query into its distinct keywords.
///
/// Lowercases, replaces punctuation other than `-` and `_` with spaces,
/// drops stop words and tokens of two characters or fewer.
pub fn normalize_query(query: &str) -> BTreeSet<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}
