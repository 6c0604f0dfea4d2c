//! Configuration management for Lore.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Config files (.lore/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with local state stored in `.lore/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Main application configuration.
///
/// This struct holds the global options shared by every command: where the
/// markdown knowledge lives, which domain to restrict to, and how to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .lore/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Directory scanned recursively for markdown knowledge
    pub knowledge_dir: PathBuf,

    /// Optional domain filter applied to knowledge file paths
    pub domain: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log output format ("pretty" or "json")
    pub log_format: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    knowledge: Option<KnowledgeSection>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnowledgeSection {
    dir: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    format: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            knowledge_dir: workspace.join("knowledge"),
            workspace,
            config_file: None,
            domain: None,
            log_level: None,
            log_format: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and environment variables.
    ///
    /// Environment variables:
    /// - `LORE_WORKSPACE`: Override workspace path
    /// - `LORE_CONFIG`: Path to config file
    /// - `LORE_KNOWLEDGE_DIR`: Markdown knowledge directory
    /// - `LORE_DOMAIN`: Domain filter
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use lore_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Knowledge: {:?}", config.knowledge_dir);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Load configuration for an explicit workspace and config file.
    ///
    /// `None` falls back to `LORE_WORKSPACE`/`LORE_CONFIG`, then to the
    /// current directory and `<workspace>/.lore/config.yaml`. The workspace
    /// must be known here, before the config file and knowledge directory
    /// are resolved against it.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace = workspace.or_else(|| std::env::var("LORE_WORKSPACE").ok().map(PathBuf::from));
        if let Some(workspace) = workspace {
            config.knowledge_dir = workspace.join("knowledge");
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("LORE_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.lore_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(dir) = std::env::var("LORE_KNOWLEDGE_DIR") {
            config.knowledge_dir = PathBuf::from(dir);
        }

        if let Ok(domain) = std::env::var("LORE_DOMAIN") {
            if !domain.trim().is_empty() {
                config.domain = Some(domain);
            }
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(knowledge) = config_file.knowledge {
            if let Some(dir) = knowledge.dir {
                let dir = PathBuf::from(dir);
                // Relative directories are resolved against the workspace
                result.knowledge_dir = if dir.is_absolute() {
                    dir
                } else {
                    result.workspace.join(dir)
                };
            }
            if let Some(domain) = knowledge.domain {
                result.domain = Some(domain);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(format) = logging.format {
                result.log_format = Some(format);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        tracing::debug!("Merged configuration from {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        knowledge_dir: Option<PathBuf>,
        domain: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            if self.knowledge_dir == self.workspace.join("knowledge") {
                self.knowledge_dir = workspace.join("knowledge");
            }
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(knowledge_dir) = knowledge_dir {
            self.knowledge_dir = knowledge_dir;
        }

        if let Some(domain) = domain {
            self.domain = Some(domain);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .lore directory.
    pub fn lore_dir(&self) -> PathBuf {
        self.workspace.join(".lore")
    }

    /// Ensure the .lore directory exists.
    pub fn ensure_lore_dir(&self) -> AppResult<()> {
        let lore_dir = self.lore_dir();
        if !lore_dir.exists() {
            std::fs::create_dir_all(&lore_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .lore directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolve the configured log format.
    pub fn log_format(&self) -> AppResult<LogFormat> {
        match &self.log_format {
            Some(format) => format.parse(),
            None => Ok(LogFormat::default()),
        }
    }

    /// Validate configuration before running a command.
    pub fn validate(&self) -> AppResult<()> {
        if !self.knowledge_dir.exists() {
            return Err(AppError::Config(format!(
                "Knowledge directory does not exist: {:?}",
                self.knowledge_dir
            )));
        }

        if !self.knowledge_dir.is_dir() {
            return Err(AppError::Config(format!(
                "Knowledge path is not a directory: {:?}",
                self.knowledge_dir
            )));
        }

        self.log_format()?;
        Ok(())
    }
}
