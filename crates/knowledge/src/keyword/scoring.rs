//! Markdown-aware line scoring and windowing.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Boost when two or more distinct keywords share a line.
pub const PHRASE_BOOST: f32 = 1.3;

/// Boost for fenced or inline code.
pub const CODE_BOOST: f32 = 1.4;

/// Boost for list items.
pub const LIST_BOOST: f32 = 1.2;

fn code_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(?:```|~~~)|`[^`]+`").ok())
        .as_ref()
}

fn list_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").ok())
        .as_ref()
}

/// Header depth (1-6) when the line is an ATX markdown header.
pub fn header_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    match trimmed[level..].chars().next() {
        None => Some(level),
        Some(c) if c.is_whitespace() => Some(level),
        _ => None,
    }
}

pub fn is_code_line(line: &str) -> bool {
    code_pattern().is_some_and(|re| re.is_match(line))
}

pub fn is_list_item(line: &str) -> bool {
    list_pattern().is_some_and(|re| re.is_match(line))
}

/// Score one line against the query keywords. Zero means no match.
pub fn score_line(line: &str, keywords: &BTreeSet<String>) -> f32 {
    let lower = line.to_lowercase();

    let mut score = 0.0;
    let mut distinct = 0;
    for keyword in keywords {
        let count = lower.matches(keyword.as_str()).count();
        if count > 0 {
            distinct += 1;
            score += count as f32;
        }
    }

    if score == 0.0 {
        return 0.0;
    }

    if distinct >= 2 {
        score *= PHRASE_BOOST;
    }
    if let Some(level) = header_level(line) {
        score *= 1.0 + 1.0 / level as f32;
    }
    if is_code_line(line) {
        score *= CODE_BOOST;
    }
    if is_list_item(line) {
        score *= LIST_BOOST;
    }

    score
}

/// Group sorted line indices into runs whose successive gaps are at most `max_gap`.
///
/// Returns `(first, last)` index pairs.
pub fn group_runs(indices: &[usize], max_gap: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut iter = indices.iter().copied();

    let Some(first) = iter.next() else {
        return runs;
    };

    let (mut start, mut end) = (first, first);
    for index in iter {
        if index - end <= max_gap {
            end = index;
        } else {
            runs.push((start, end));
            start = index;
            end = index;
        }
    }
    runs.push((start, end));
    runs
}

/// Expand a run by `context_lines` on both sides, then snap the start back
/// to the nearest header found within another `context_lines` lines.
///
/// Returns inclusive `(start, end)` line indices.
pub fn expand_run(
    lines: &[&str],
    run: (usize, usize),
    context_lines: usize,
) -> (usize, usize) {
    let last_line = lines.len().saturating_sub(1);
    let mut start = run.0.saturating_sub(context_lines);
    let end = (run.1 + context_lines).min(last_line);

    let floor = start.saturating_sub(context_lines);
    if let Some(header) = (floor..=start).rev().find(|&i| header_level(lines[i]).is_some()) {
        start = header;
    }

    (start, end)
}

/// Fraction of distinct query keywords present in `text`, in [0, 1].
pub fn coverage_score(text: &str, keywords: &BTreeSet<String>) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let found = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
    found as f32 / keywords.len() as f32
}
