//! Command handlers for the lore CLI.
//!
//! Engine calls are synchronous and may embed a whole corpus, so every
//! handler runs them on tokio's blocking pool.

pub mod index;
pub mod init;
pub mod query;
pub mod validate;

// Re-export command types for convenience
pub use index::{FilesCommand, IndexCommand};
pub use init::InitCommand;
pub use query::{ContextCommand, SearchCommand, SourcesCommand};
pub use validate::ValidateCommand;

use lore_core::{config::AppConfig, AppError, AppResult};
use lore_knowledge::{load_config, KnowledgeBase};

/// Open the knowledge base described by the application config.
pub(crate) fn open_knowledge_base(config: &AppConfig) -> AppResult<KnowledgeBase> {
    config.validate()?;

    let kb_config = load_config(&config.workspace)?;
    let kb = KnowledgeBase::new(&config.knowledge_dir, kb_config);

    Ok(match &config.domain {
        Some(domain) => kb.with_domain(domain.clone()),
        None => kb,
    })
}

/// Run blocking engine work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Other(format!("Background task failed: {}", e)))?
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json(value: &serde_json::Value) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
