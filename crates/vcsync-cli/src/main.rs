//! vcsync CLI - Inspect the synchronization state of a working copy
//!
//! Provides commands for:
//! - Viewing dirty indicators and sync records
//! - Listing the decoded entries of a managed folder
//! - Adding ignore patterns
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, entries::EntriesCommand, ignore::IgnoreCommand,
    status::StatusCommand, Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "vcsync",
    version,
    about = "Synchronization state of a version-control working copy"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Working-copy root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show dirty state and sync records
    Status(StatusCommand),
    /// Print the sync records of a managed folder
    Entries(EntriesCommand),
    /// Append an ignore pattern to a folder
    Ignore(IgnoreCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = Context::load(cli.config.clone(), cli.root.clone(), cli.quiet)?;

    // Setup tracing
    let filter = match cli.verbose {
        0 => context.config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&context, format).await,
        Commands::Entries(cmd) => cmd.execute(&context, format).await,
        Commands::Ignore(cmd) => cmd.execute(&context, format).await,
        Commands::Config(cmd) => cmd.execute(&context, format).await,
    }
}
