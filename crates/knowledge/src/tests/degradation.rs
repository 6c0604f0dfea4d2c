use super::{keyword_config, vector_config, write_files, zigbee_corpus, PASTA_DOC};
use crate::config::KnowledgeBaseConfig;
use crate::embeddings::providers::trigram::TrigramEmbedder;
use crate::embeddings::{Embedder, EmbeddingConfig};
use crate::knowledge_base::KnowledgeBase;
use crate::types::BackendKind;
use lore_core::{AppError, AppResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Trigram embedder that can be switched into a failing state.
#[derive(Debug)]
struct FlakyEmbedder {
    inner: TrigramEmbedder,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    fn new(failing: bool) -> Self {
        Self {
            inner: TrigramEmbedder::new(256),
            failing: AtomicBool::new(failing),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for FlakyEmbedder {
    fn provider_name(&self) -> &str {
        "flaky"
    }

    fn model_name(&self) -> &str {
        "flaky-trigram"
    }

    fn embedding_dim(&self) -> usize {
        self.inner.embedding_dim()
    }

    fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Embedding("backend went away".to_string()));
        }
        self.inner.embed(texts)
    }
}

#[test]
fn test_disabled_provider_falls_back_to_keyword() {
    let temp = zigbee_corpus();
    let kb = KnowledgeBase::new(temp.path(), keyword_config());

    assert_eq!(kb.backend_kind(), BackendKind::Keyword);
    assert!(kb.index_metadata().is_none());
    assert!(!kb.search("zigbee", 3, 3).is_empty());
}

#[test]
fn test_unknown_provider_falls_back_to_keyword() {
    let temp = zigbee_corpus();
    let config = KnowledgeBaseConfig {
        embedding: EmbeddingConfig {
            provider: "no-such-provider".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let kb = KnowledgeBase::new(temp.path(), config);

    assert_eq!(kb.backend_kind(), BackendKind::Keyword);
    assert!(!kb.get_sources("zigbee", 3).is_empty());
}

#[test]
fn test_build_failure_is_permanent_fallback() {
    let temp = zigbee_corpus();
    let embedder = Arc::new(FlakyEmbedder::new(true));
    let kb = KnowledgeBase::new(temp.path(), vector_config()).with_embedder(embedder.clone());

    assert_eq!(kb.backend_kind(), BackendKind::Keyword);
    let calls_after_init = embedder.calls.load(Ordering::SeqCst);

    embedder.failing.store(false, Ordering::SeqCst);
    assert!(!kb.search("zigbee", 3, 3).is_empty());
    assert_eq!(kb.backend_kind(), BackendKind::Keyword);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_init);
}

#[test]
fn test_runtime_failure_degrades_single_call() {
    let temp = zigbee_corpus();
    let embedder = Arc::new(FlakyEmbedder::new(false));
    let kb = KnowledgeBase::new(temp.path(), vector_config()).with_embedder(embedder.clone());

    assert_eq!(kb.backend_kind(), BackendKind::Vector);

    embedder.failing.store(true, Ordering::SeqCst);
    let before = embedder.calls.load(Ordering::SeqCst);
    let degraded = kb.search("zigbee protocol", 3, 3);

    assert!(!degraded.is_empty());
    assert!(degraded[0].content.to_lowercase().contains("zigbee"));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 1);
    assert_eq!(kb.backend_kind(), BackendKind::Vector);

    // The next call tries the vector index again.
    embedder.failing.store(false, Ordering::SeqCst);
    let recovered = kb.search("zigbee protocol", 3, 3);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), before + 2);
    assert!(!recovered.is_empty());
}

#[test]
fn test_runtime_failure_context_still_answers() {
    let temp = zigbee_corpus();
    let embedder = Arc::new(FlakyEmbedder::new(false));
    let kb = KnowledgeBase::new(temp.path(), vector_config()).with_embedder(embedder.clone());
    assert_eq!(kb.backend_kind(), BackendKind::Vector);

    embedder.failing.store(true, Ordering::SeqCst);
    let context = kb.get_context("zigbee", 1000);
    assert!(context.starts_with("[From: zigbee.md]"));
}

#[test]
fn test_instances_do_not_share_state() {
    let first = zigbee_corpus();
    let second = TempDir::new().unwrap();
    write_files(second.path(), &[("pasta.md", PASTA_DOC)]);

    let zigbee_kb = KnowledgeBase::new(first.path(), keyword_config());
    let pasta_kb = KnowledgeBase::new(second.path(), keyword_config());

    assert!(!zigbee_kb.search("zigbee", 3, 3).is_empty());
    assert!(pasta_kb.search("zigbee", 3, 3).is_empty());
    assert_eq!(pasta_kb.list_all_files(), vec!["pasta.md"]);
}

#[test]
fn test_concurrent_searches_share_one_backend() {
    let temp = zigbee_corpus();
    let kb = Arc::new(KnowledgeBase::new(temp.path(), vector_config()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let kb = Arc::clone(&kb);
            std::thread::spawn(move || kb.search("zigbee protocol", 3, 3))
        })
        .collect();

    for handle in handles {
        let results = handle.join().unwrap();
        assert!(results[0].content.contains("Zigbee"));
    }
    assert_eq!(kb.backend_kind(), BackendKind::Vector);
}
