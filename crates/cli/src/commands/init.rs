//! Init command handler.

use super::print_json;
use clap::Args;
use lore_core::{config::AppConfig, AppResult};
use lore_knowledge::{config::get_config_path, save_config, KnowledgeBaseConfig};

/// Write the default knowledge configuration to .lore/knowledge.yaml
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl InitCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing init command");

        config.ensure_lore_dir()?;
        let path = get_config_path(&config.workspace);
        let exists = path.exists();

        let written = if exists && !self.force {
            tracing::warn!("Config already exists at {:?}", path);
            false
        } else {
            save_config(&config.workspace, &KnowledgeBaseConfig::default())?;
            true
        };

        if self.json {
            return print_json(&serde_json::json!({
                "path": path,
                "written": written,
            }));
        }

        if written {
            println!("Wrote {}", path.display());
        } else {
            println!("{} already exists (use --force to overwrite)", path.display());
        }

        Ok(())
    }
}
