//! Bracelet CLI - Command-line client for the Bracelet platform API
//!
//! Provides commands for:
//! - Logging in and out, and inspecting the stored session
//! - Searching, reading and deleting platform resources
//! - Uploading instrument manuals to blob storage
//! - Viewing and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use bracelet_core::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand,
    completions::CompletionsCommand,
    config::ConfigCommand,
    resource::{DeleteCommand, GetCommand, SearchCommand},
    upload::UploadCommand,
    CliContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "bracelet", version, about = "Client for the Bracelet platform API")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Session commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Search a resource collection
    Search(SearchCommand),
    /// Fetch a single resource
    Get(GetCommand),
    /// Delete a single resource
    Delete(DeleteCommand),
    /// Upload an instrument manual
    Upload(UploadCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // Setup tracing
    let filter = match (cli.verbose, cli.quiet) {
        (0, true) => "error",
        (0, false) => config.logging.level.as_str(),
        (1, _) => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config, &config_path, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
        command => {
            let ctx = CliContext::build(config, format).await?;
            let outcome = match command {
                Commands::Auth(cmd) => cmd.execute(&ctx, format).await,
                Commands::Search(cmd) => cmd.execute(&ctx, format).await,
                Commands::Get(cmd) => cmd.execute(&ctx, format).await,
                Commands::Delete(cmd) => cmd.execute(&ctx, format).await,
                Commands::Upload(cmd) => cmd.execute(&ctx, format).await,
                Commands::Config(_) | Commands::Completions(_) => Ok(()),
            };
            if let Err(err) = &outcome {
                let action = ctx.exceptions.manage_error(&**err).await;
                if action.notice.is_none() {
                    get_formatter(format).error(&format!("{err:#}"));
                }
                std::process::exit(1);
            }
            outcome
        }
    }
}
