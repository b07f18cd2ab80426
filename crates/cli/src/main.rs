//! Fleet Monitor CLI
//!
//! A command-line tool for reading the fleet health view, listing and
//! acknowledging alerts, and inspecting containers, runners and checks.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, health, resources};
use monitor_lib::models::{AlertLevel, AlertType};

/// Fleet Monitor CLI
#[derive(Parser)]
#[command(name = "fleetmon")]
#[command(author, version, about = "CLI for the Fleet Monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via FLEETMON_API_URL env var)
    #[arg(long, env = "FLEETMON_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the aggregated fleet health view
    Health,

    /// List open alerts
    Alerts {
        /// Filter by level (WARNING, CRITICAL)
        #[arg(long)]
        level: Option<AlertLevel>,

        /// Filter by alert type (e.g. CPU_HIGH, CONTAINER_DOWN)
        #[arg(long = "type")]
        alert_type: Option<AlertType>,

        /// Show only acknowledged alerts
        #[arg(long)]
        acknowledged: bool,
    },

    /// Acknowledge an open alert
    Ack {
        /// Alert ID to acknowledge
        id: String,
    },

    /// Show container runtime status
    Containers,

    /// Show CI runner status
    Runners,

    /// Show the latest verdict of every collector
    Checks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::Config::load()?;
    let api_url = settings.resolve_api_url(cli.api_url.as_deref());
    let format = cli.format.unwrap_or_else(|| settings.format());

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Health => health::show_health(&client, format).await?,
        Commands::Alerts {
            level,
            alert_type,
            acknowledged,
        } => {
            alerts::list_alerts(&client, level, alert_type, acknowledged, format).await?;
        }
        Commands::Ack { id } => alerts::acknowledge(&client, &id).await?,
        Commands::Containers => resources::show_containers(&client, format).await?,
        Commands::Runners => resources::show_runners(&client, format).await?,
        Commands::Checks => health::show_checks(&client, format).await?,
    }

    Ok(())
}
