//! Query command handlers.
//!
//! Search passages, assemble model-ready context and list matching sources.

use super::{open_knowledge_base, print_json, run_blocking};
use clap::Args;
use lore_core::{config::AppConfig, AppResult};

/// Search the knowledge base for ranked passages
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Maximum number of passages (default: configured top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Lines of surrounding context for keyword matches
    #[arg(long)]
    pub context_lines: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let config = config.clone();
        let query = self.query.clone();
        let top_k = self.top_k;
        let context_lines = self.context_lines;

        let (backend, results) = run_blocking(move || {
            let kb = open_knowledge_base(&config)?;
            let top_k = top_k.unwrap_or(kb.config().top_k);
            let context_lines = context_lines.unwrap_or(kb.config().context_lines);
            let results = kb.search(&query, top_k, context_lines);
            Ok((kb.backend_kind(), results))
        })
        .await?;

        tracing::debug!(backend = backend.as_str(), results = results.len(), "Search finished");

        if self.json {
            let output = serde_json::json!({
                "query": self.query,
                "backend": backend.as_str(),
                "results": results,
            });
            return print_json(&output);
        }

        if results.is_empty() {
            println!("No results for '{}'", self.query);
            return Ok(());
        }

        for (i, result) in results.iter().enumerate() {
            println!(
                "{}. {} (lines {}-{}, score: {:.2})",
                i + 1,
                result.file_name(),
                result.line_start,
                result.line_end,
                result.score
            );
            for line in result.content.lines() {
                println!("   {}", line);
            }
            println!();
        }
        println!("Backend: {}", backend.as_str());

        Ok(())
    }
}

/// Assemble a bounded context block for a query
#[derive(Args, Debug)]
pub struct ContextCommand {
    /// Query text
    pub query: String,

    /// Maximum context length in bytes (default: configured max_context_length)
    #[arg(short = 'm', long)]
    pub max_length: Option<usize>,

    /// Sanitize passages and append citations
    #[arg(long)]
    pub safe: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ContextCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing context command (safe: {})", self.safe);

        let config = config.clone();
        let query = self.query.clone();
        let max_length = self.max_length;
        let safe = self.safe;

        let output = run_blocking(move || {
            let kb = open_knowledge_base(&config)?;
            let max_length = max_length.unwrap_or(kb.config().max_context_length);

            if safe {
                let formatted = kb.get_safe_context(&query, max_length);
                if !formatted.all_safe {
                    tracing::warn!("Retrieved content contained suspicious patterns");
                }
                Ok(serde_json::json!({
                    "context": formatted.context,
                    "sources": formatted.sources,
                    "allSafe": formatted.all_safe,
                }))
            } else {
                Ok(serde_json::json!({
                    "context": kb.get_context(&query, max_length),
                }))
            }
        })
        .await?;

        if self.json {
            return print_json(&output);
        }

        if let Some(context) = output["context"].as_str() {
            println!("{}", context);
        }

        Ok(())
    }
}

/// List the files that answer a query
#[derive(Args, Debug)]
pub struct SourcesCommand {
    /// Query text
    pub query: String,

    /// Maximum number of passages to consider (default: configured top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SourcesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing sources command");

        let config = config.clone();
        let query = self.query.clone();
        let top_k = self.top_k;

        let sources = run_blocking(move || {
            let kb = open_knowledge_base(&config)?;
            let top_k = top_k.unwrap_or(kb.config().top_k);
            Ok(kb.get_sources(&query, top_k))
        })
        .await?;

        if self.json {
            let output = serde_json::json!({
                "query": self.query,
                "sources": sources,
            });
            return print_json(&output);
        }

        if sources.is_empty() {
            println!("No sources for '{}'", self.query);
        }
        for source in &sources {
            println!("{}", source);
        }

        Ok(())
    }
}
