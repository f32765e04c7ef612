//! Docker Monitor CLI
//!
//! A command-line tool for querying the latest snapshot, alert history and
//! stored samples from a running docker-monitor daemon.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, history, status};

/// Docker Monitor CLI
#[derive(Parser)]
#[command(name = "dmon")]
#[command(author, version, about = "CLI for Docker Monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via DMON_API_URL env var)
    #[arg(long, env = "DMON_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Dashboard username
    #[arg(long, short, env = "DMON_USER")]
    pub user: Option<String>,

    /// Dashboard password
    #[arg(long, short, env = "DMON_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest containers, host sample and active anomalies
    Status,

    /// List recent alerts, newest first
    Alerts {
        /// Look-back window in hours (1 to 168)
        #[arg(long, default_value_t = 24.0)]
        hours: f64,
    },

    /// Show stored samples for a container
    History {
        /// Container name
        name: String,

        /// Look-back window in hours (0.1 to 168)
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
    },

    /// Show stored host samples
    Host {
        /// Look-back window in hours (0.1 to 168)
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
    },

    /// Check that the daemon is up
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url, cli.user, cli.password)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Alerts { hours } => alerts::list_alerts(&client, hours, cli.format).await?,
        Commands::History { name, hours } => {
            history::container_history(&client, &name, hours, cli.format).await?
        }
        Commands::Host { hours } => history::host_history(&client, hours, cli.format).await?,
        Commands::Health => status::show_health(&client, cli.format).await?,
    }

    Ok(())
}
