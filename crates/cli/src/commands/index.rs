//! Index command handlers.

use super::{open_knowledge_base, print_json, run_blocking};
use clap::Args;
use lore_core::{config::AppConfig, AppResult};

/// List every markdown file in the knowledge base
#[derive(Args, Debug)]
pub struct FilesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl FilesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing files command");

        let config = config.clone();
        let files = run_blocking(move || Ok(open_knowledge_base(&config)?.list_all_files())).await?;

        if self.json {
            return print_json(&serde_json::json!({ "files": files }));
        }

        for file in &files {
            println!("{}", file);
        }
        println!("{} file(s)", files.len());

        Ok(())
    }
}

/// Build the vector index, or show the cached one
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Show the cached index without rebuilding
    #[arg(long)]
    pub status: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if self.status {
            self.show_status(config).await
        } else {
            self.rebuild(config).await
        }
    }

    async fn rebuild(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Rebuilding vector index");

        let config = config.clone();
        let (index_dir, stats) = run_blocking(move || {
            let kb = open_knowledge_base(&config)?;
            let stats = kb.rebuild_index()?;
            Ok((kb.index_dir(), stats))
        })
        .await?;

        if self.json {
            let output = serde_json::json!({
                "indexDir": index_dir,
                "filesCount": stats.files_count,
                "chunksCount": stats.chunks_count,
                "embeddingDim": stats.embedding_dim,
                "durationSecs": stats.duration_secs,
            });
            return print_json(&output);
        }

        println!(
            "Indexed {} files ({} chunks, dim {}) in {:.2}s",
            stats.files_count, stats.chunks_count, stats.embedding_dim, stats.duration_secs
        );
        println!("Index: {}", index_dir.display());

        Ok(())
    }

    async fn show_status(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Reading index status");

        let config = config.clone();
        let (index_dir, backend, metadata) = run_blocking(move || {
            let kb = open_knowledge_base(&config)?;
            let backend = kb.backend_kind();
            Ok((kb.index_dir(), backend, kb.index_metadata().cloned()))
        })
        .await?;

        if self.json {
            let output = serde_json::json!({
                "indexDir": index_dir,
                "backend": backend.as_str(),
                "metadata": metadata,
            });
            return print_json(&output);
        }

        println!("Backend: {}", backend.as_str());
        println!("Index: {}", index_dir.display());
        match metadata {
            Some(metadata) => {
                println!("Model: {} (dim {})", metadata.model_name, metadata.embedding_dim);
                println!("Chunks: {}", metadata.chunk_count);
                println!("Files: {}", metadata.source_files.len());
                println!("Built: {}", metadata.built_at.to_rfc3339());
            }
            None => println!("No vector index in use"),
        }

        Ok(())
    }
}
