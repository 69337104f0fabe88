//! devops-ingest - command-line driver for incremental Azure DevOps ingestion.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::slim::SlimArgs;
use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "devops-ingest")]
#[command(version)]
#[command(about = "Incremental, checkpointed ingestion from Azure DevOps")]
#[command(
    long_about = "devops-ingest pulls work items, and optionally commits, releases, test runs \
and wiki pages, from one Azure DevOps project. Each run covers a time window, writes documents \
as JSON lines to stdout, and saves a checkpoint so the next run picks up where this one stopped."
)]
#[command(after_long_help = r#"EXAMPLES
    Check the token and project:
        $ devops-ingest validate

    Ingest everything changed since the last run:
        $ devops-ingest sync > documents.jsonl

    Ingest a fixed window, work items and wikis only:
        $ devops-ingest sync --start 2024-01-01T00:00:00Z --end 2024-02-01T00:00:00Z -t work_items -t wikis

    List document ids for pruning:
        $ devops-ingest slim

CONFIGURATION
    devops-ingest reads configuration from:
      1. ~/.config/devops-ingest/config.toml (or $XDG_CONFIG_HOME/devops-ingest/config.toml)
      2. ./devops-ingest.toml, or the file given with --config
      3. Environment variables (DEVOPS_INGEST_ prefix, nested keys joined by __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    DEVOPS_INGEST_CONNECTOR__ORGANIZATION             Azure DevOps organization
    DEVOPS_INGEST_CONNECTOR__PROJECT                  Project name
    DEVOPS_INGEST_CONNECTOR__DATA_TYPES               Comma-separated data types
    DEVOPS_INGEST_CREDENTIALS__PERSONAL_ACCESS_TOKEN  Personal access token
    DEVOPS_INGEST_SYNC__CHECKPOINT_PATH               Run state file
"#)]
struct Cli {
    /// Config file (replaces ./devops-ingest.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the token against the organization and that the project exists
    Validate,
    /// Ingest one time window, writing JSON lines to stdout
    Sync(SyncArgs),
    /// List every work item document id in scope
    Slim(SlimArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // stdout carries documents, so logs always go to stderr. With an
    // interactive stderr the progress reporter draws instead, unless RUST_LOG
    // asks for logs explicitly.
    let interactive = Term::stderr().is_term();
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => Some(filter),
        Err(_) if interactive => None,
        Err(_) => Some(EnvFilter::new("devops_ingest=info,devops_ingest_cli=info")),
    };
    if let Some(env_filter) = env_filter {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    // Load configuration (config file -> env vars -> defaults)
    let config = config::Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Validate => commands::validate::handle_validate(&config).await?,
        Commands::Sync(args) => commands::sync::handle_sync(args, config).await?,
        Commands::Slim(args) => commands::slim::handle_slim(args, &config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_flags_parse() {
        let cli = Cli::try_parse_from([
            "devops-ingest",
            "--config",
            "/tmp/c.toml",
            "sync",
            "--start",
            "2024-01-01T00:00:00Z",
            "-t",
            "work_items",
            "-t",
            "Wikis",
            "--max-pages",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Sync(_)));
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let result = Cli::try_parse_from(["devops-ingest", "sync", "-t", "pull_requests"]);
        assert!(result.is_err());
    }
}
