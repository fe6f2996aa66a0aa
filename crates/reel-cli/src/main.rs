//! Reel CLI - Headless playback simulator
//!
//! Replays a JSON trace of engine signals and user commands through
//! reel-core and prints the resulting event stream.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Reel CLI - Playback core simulator
#[derive(Parser)]
#[command(name = "reel-cli")]
#[command(author = "Reel Contributors")]
#[command(version)]
#[command(about = "Replay engine signal traces through the playback core", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a trace and print every event published
    Simulate {
        /// Path to the trace JSON
        trace: PathBuf,

        /// Options JSON, overriding the trace's own `options`
        #[arg(short, long)]
        options: Option<PathBuf>,
    },

    /// List the well-known event names
    Events,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so json output stays parseable
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
    reel_core::init();

    match cli.command {
        Commands::Simulate { trace, options } => {
            commands::simulate(&trace, options.as_deref(), &cli.format).await?;
        }
        Commands::Events => {
            commands::events(&cli.format)?;
        }
    }

    Ok(())
}
