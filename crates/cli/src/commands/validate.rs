//! Validate command handler.
//!
//! Checks a document or snippet for prompt-injection patterns before it is
//! added to the knowledge base.

use super::print_json;
use clap::Args;
use lore_core::{config::AppConfig, AppError, AppResult};
use lore_knowledge::{load_config, SafetyLayer};
use std::path::PathBuf;

/// Check content for prompt-injection patterns
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("input").required(true).args(["file", "text"])))]
pub struct ValidateCommand {
    /// File to check
    pub file: Option<PathBuf>,

    /// Inline text to check
    #[arg(long)]
    pub text: Option<String>,

    /// Exit with an error when the content is unsafe
    #[arg(long)]
    pub strict: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing validate command");

        let content = match (&self.file, &self.text) {
            (Some(path), _) => tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
            })?,
            (None, Some(text)) => text.clone(),
            (None, None) => {
                return Err(AppError::InvalidInput(
                    "Provide a file or --text to validate".to_string(),
                ))
            }
        };

        let safety = SafetyLayer::new(load_config(&config.workspace)?.safety);
        let report = safety.validate(&content);

        if self.json {
            let output = serde_json::json!({
                "isSafe": report.is_safe,
                "hasInjection": report.has_injection,
                "warnings": report.warnings,
            });
            print_json(&output)?;
        } else {
            println!("{}", if report.is_safe { "SAFE" } else { "UNSAFE" });
            for warning in &report.warnings {
                println!("  - {}", warning);
            }
        }

        if self.strict && !report.is_safe {
            return Err(AppError::InvalidInput(
                "Content failed safety validation".to_string(),
            ));
        }

        Ok(())
    }
}
