//! Eris CLI
//!
//! A command-line tool for submitting samples to the anomaly detector
//! and inspecting its history, model slots and health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{detect, inspect};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Eris anomaly detector CLI
#[derive(Parser)]
#[command(name = "eris")]
#[command(author, version, about = "CLI for the Eris anomaly detector", long_about = None)]
pub struct Cli {
    /// Detector URL (can also be set via ERIS_API_URL env var)
    #[arg(long, env = "ERIS_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit one sample and print the verdicts it produced
    Detect {
        /// Process id the sample belongs to
        #[arg(long)]
        entity: i64,

        /// Metric kind
        #[arg(long, value_enum)]
        kind: detect::KindArg,

        /// Sample value (cpu, memory, disk)
        #[arg(long, required_unless_present = "received")]
        value: Option<f64>,

        /// Interface name (network)
        #[arg(long)]
        interface: Option<String>,

        /// Received bytes (network)
        #[arg(long, requires = "transmitted")]
        received: Option<f64>,

        /// Transmitted bytes (network)
        #[arg(long, requires = "received")]
        transmitted: Option<f64>,
    },

    /// Show recent predictions, oldest first
    History {
        /// Show only the last N records
        #[arg(long, short)]
        limit: Option<usize>,

        /// Show only anomalies
        #[arg(long)]
        anomalies: bool,
    },

    /// Show per-key series and model state
    Models,

    /// Show detector health and readiness
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = config::Config::load()?;

    let api_url = cli
        .api_url
        .or(file_config.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let format = cli
        .format
        .or_else(|| file_config.default_format.as_deref().and_then(output::OutputFormat::parse))
        .unwrap_or_default();

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Detect {
            entity,
            kind,
            value,
            interface,
            received,
            transmitted,
        } => {
            let metric = detect::build_metric(entity, kind, value, interface, received, transmitted)?;
            detect::submit(&client, metric, format).await?;
        }
        Commands::History { limit, anomalies } => {
            inspect::show_history(&client, limit, anomalies, format).await?;
        }
        Commands::Models => {
            inspect::show_models(&client, format).await?;
        }
        Commands::Status => {
            inspect::show_status(&client, format).await?;
        }
    }

    Ok(())
}
