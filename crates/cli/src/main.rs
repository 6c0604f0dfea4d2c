//! Lore CLI
//!
//! Main entry point for the lore command-line tool.
//! Queries a directory of markdown knowledge with vector or keyword search.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    ContextCommand, FilesCommand, IndexCommand, InitCommand, SearchCommand, SourcesCommand,
    ValidateCommand,
};
use lore_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Lore CLI - retrieval over local markdown knowledge
#[derive(Parser, Debug)]
#[command(name = "lore")]
#[command(about = "Retrieval over local markdown knowledge", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "LORE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "LORE_CONFIG")]
    config: Option<PathBuf>,

    /// Markdown knowledge directory (default: <workspace>/knowledge)
    #[arg(long, global = true, env = "LORE_KNOWLEDGE_DIR")]
    knowledge_dir: Option<PathBuf>,

    /// Restrict retrieval to files whose path contains this domain
    #[arg(short, long, global = true, env = "LORE_DOMAIN")]
    domain: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default knowledge configuration
    Init(InitCommand),

    /// Search for ranked passages
    Search(SearchCommand),

    /// Assemble context for a language model
    Context(ContextCommand),

    /// List source files that answer a query
    Sources(SourcesCommand),

    /// List all knowledge files
    Files(FilesCommand),

    /// Build or inspect the vector index
    Index(IndexCommand),

    /// Check content for prompt-injection patterns
    Validate(ValidateCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // The workspace decides which config file and knowledge dir apply
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.knowledge_dir,
        cli.domain,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if let Some(format) = cli.log_format {
        config.log_format = Some(format);
    }

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format()?)?;

    tracing::info!("Lore CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Knowledge dir: {:?}", config.knowledge_dir);
    tracing::debug!("Domain: {:?}", config.domain);

    let command_name = match &cli.command {
        Commands::Init(_) => "init",
        Commands::Search(_) => "search",
        Commands::Context(_) => "context",
        Commands::Sources(_) => "sources",
        Commands::Files(_) => "files",
        Commands::Index(_) => "index",
        Commands::Validate(_) => "validate",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Init(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Context(cmd) => cmd.execute(&config).await,
        Commands::Sources(cmd) => cmd.execute(&config).await,
        Commands::Files(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Validate(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
