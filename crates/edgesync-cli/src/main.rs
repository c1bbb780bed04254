//! edgesync CLI - Command-line interface for edgesync
//!
//! Provides commands for:
//! - Listing folders under a remote prefix
//! - Syncing a local directory to an object store prefix
//! - Purging CDN caches
//! - Inspecting configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use edgesync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, flush::FlushCommand, list::ListCommand, sync::SyncCommand, Context,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "edgesync",
    version,
    about = "Incremental sync of a local directory to S3-compatible storage"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List folders directly under a remote prefix
    List(ListCommand),
    /// Upload a local directory to a remote prefix
    Sync(SyncCommand),
    /// Purge CDN cache for a URL or prefix
    Flush(FlushCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => config.logging.level.as_str(),
        (_, 1) => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let (config, config_path) = commands::load_config(cli.config.as_deref())?;
    init_tracing(&cli, &config);

    let ctx = Context {
        config,
        config_path,
        format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::List(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Flush(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let formatter = get_formatter(
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        cli.quiet,
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
