//! Markdown discovery and loading.
//!
//! The knowledge directory is scanned recursively for `*.md` files. Hidden
//! directories (the index cache, VCS metadata) are never descended into.

use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A markdown file loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownDocument {
    /// Absolute or knowledge-dir-joined path
    pub path: PathBuf,

    /// Raw file content
    pub content: String,
}

/// Whether a path looks like a markdown file.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Whether a file belongs to the requested domain.
///
/// Matching is a case-insensitive substring test against the path relative
/// to the knowledge directory and against the file stem.
pub fn matches_domain(path: &Path, knowledge_dir: &Path, domain: Option<&str>) -> bool {
    let Some(domain) = domain.map(str::trim).filter(|d| !d.is_empty()) else {
        return true;
    };
    let needle = domain.to_lowercase();

    let relative = relative_path(path, knowledge_dir).to_lowercase();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    relative.contains(&needle) || stem.contains(&needle)
}

/// Recursively find markdown files under `knowledge_dir`, sorted by path.
pub fn discover_markdown_files(knowledge_dir: &Path, domain: Option<&str>) -> Vec<PathBuf> {
    if !knowledge_dir.is_dir() {
        tracing::debug!("Knowledge directory {:?} does not exist", knowledge_dir);
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(knowledge_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(|e| e.into_path())
        .filter(|p| matches_domain(p, knowledge_dir, domain))
        .collect();

    files.sort();

    tracing::debug!(
        "Discovered {} markdown files under {:?} (domain: {:?})",
        files.len(),
        knowledge_dir,
        domain
    );

    files
}

/// Load every markdown file under `knowledge_dir`.
///
/// Unreadable or non-UTF-8 files are skipped with a warning.
pub fn load_documents(knowledge_dir: &Path, domain: Option<&str>) -> Vec<MarkdownDocument> {
    discover_markdown_files(knowledge_dir, domain)
        .into_iter()
        .filter_map(|path| match fs::read_to_string(&path) {
            Ok(content) => Some(MarkdownDocument { path, content }),
            Err(e) => {
                tracing::warn!("Skipping unreadable markdown file {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

/// Render `path` relative to `base`, falling back to the full path.
pub fn relative_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string_lossy().to_string())
}
