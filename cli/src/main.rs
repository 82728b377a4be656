//! Ticket Live CLI
//!
//! Terminal view of the ticket queue with live updates.
//!
//! # Usage
//!
//! ```bash
//! ticket-live watch --status new
//! ticket-live show 7f3c2a10-...
//! ticket-live status 7f3c2a10-... resolved
//! ticket-live enrich-all
//! ticket-live events --limit 10 --format json
//! ```

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

/// Status values the backend pipeline uses
pub const KNOWN_STATUSES: &[&str] = &[
    "new", "enriching", "enriched", "routed", "open", "progress", "resolved", "closed",
];

#[derive(Parser)]
#[command(name = "ticket-live")]
#[command(version)]
#[command(about = "Live ticket queue in the terminal", long_about = None)]
struct Cli {
    /// API base URL
    #[arg(long, env = "TICKET_LIVE_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the API
    #[arg(long, env = "TICKET_LIVE_API_TOKEN")]
    api_token: Option<String>,

    /// Output format
    #[arg(long, short)]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ticket list and keep it live
    Watch {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        sentiment: Option<String>,
        /// Ticket type filter
        #[arg(long = "type")]
        ticket_type: Option<String>,
        #[arg(long)]
        segment: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show one ticket with AI analysis, assignment and audit trail
    Show {
        id: String,
        /// Keep the view open and reprint on updates
        #[arg(long)]
        follow: bool,
    },
    /// Change a ticket's status
    #[command(after_help = "Known statuses: new, enriching, enriched, routed, open, progress, resolved, closed")]
    Status { id: String, status: String },
    /// Request AI enrichment for one ticket
    Enrich { id: String },
    /// Request AI enrichment for every ticket
    EnrichAll,
    /// Print ticket updates as they arrive
    Events {
        /// Exit after this many updates
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set configuration value
    Set { key: String, value: String },
    /// Get configuration value
    Get { key: String },
    /// List all configuration
    List,
    /// Initialize configuration
    Init,
}

const DEFAULT_LOG_FILTER: &str = "info";

fn log_filter(rust_log: Option<String>) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.into())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(
            std::env::var("RUST_LOG").ok(),
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => commands::config::handle(action, cli.profile.as_deref()),
        command => run(command, cli.api_url, cli.api_token, cli.format, cli.profile).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(
    command: Commands,
    api_url: Option<String>,
    api_token: Option<String>,
    format: Option<output::OutputFormat>,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let file = config::Config::load(profile.as_deref()).unwrap_or_default();
    let format = format.or_else(|| file.format()).unwrap_or_default();
    let live = file.to_live_config(api_url, api_token);
    let client = ticket_live::LiveClient::new(live)?;

    match command {
        Commands::Watch {
            status,
            sentiment,
            ticket_type,
            segment,
            search,
            page,
        } => {
            let query = ticket_live::ListQuery {
                page,
                status,
                sentiment,
                ticket_type,
                segment,
                search,
                ..client.default_query()
            };
            commands::watch::handle(&client, query, format).await
        }
        Commands::Show { id, follow } => commands::tickets::show(&client, &id, follow, format).await,
        Commands::Status { id, status } => commands::tickets::set_status(&client, &id, &status, format).await,
        Commands::Enrich { id } => commands::tickets::enrich(&client, &id, format).await,
        Commands::EnrichAll => commands::tickets::enrich_all(&client, format).await,
        Commands::Events { limit } => commands::events::handle(&client, limit, format).await,
        Commands::Config { .. } => unreachable!("handled before the client is built"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None), "info");
        assert_eq!(log_filter(Some("  ".into())), "info");
        assert_eq!(log_filter(Some("ticket_live=debug".into())), "ticket_live=debug");
    }
}
