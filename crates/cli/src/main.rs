//! Sentinel CLI
//!
//! A command-line tool for inspecting anomaly statistics, downloading
//! security reports and triggering retraining on a sentinel server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{detection, health};

/// Sentinel CLI
#[derive(Parser)]
#[command(name = "sentinelctl")]
#[command(author, version, about = "CLI for the Sentinel anomaly detector", long_about = None)]
pub struct Cli {
    /// Server URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show anomaly statistics for the most recent requests
    Stats,

    /// Download the security report
    Report {
        /// Output file path ("-" for stdout; defaults to the server's file name)
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Train and publish a new model now
    Train,

    /// Show server health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Stats => detection::show_stats(&client, cli.format).await?,
        Commands::Report { output } => detection::download_report(&client, output).await?,
        Commands::Train => detection::train(&client, cli.format).await?,
        Commands::Health => health::show_health(&client, cli.format).await?,
    }

    Ok(())
}
