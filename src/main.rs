//! Ticket Sniper - timed ticket acquisition through a driven browser
//!
//! # WARNING
//! - Automated purchasing may violate the ticketing site's terms of service.
//! - Sites run risk control; aggressive retry settings can get an account blocked.
//! - Payment is never automated. A successful run leaves the order awaiting payment.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use tracing::{error, info};

// Use the library crate
use ticket_sniper::acquisition::{FinalOutcome, RunSummary};
use ticket_sniper::cli::commands;
use ticket_sniper::config::Config;

/// Ticket Sniper - timed ticket acquisition
#[derive(Parser)]
#[command(name = "ticket-sniper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Item page URL, replaces the configured target
    #[arg(long, value_name = "URL")]
    target_override: Option<String>,

    /// Submit the order automatically instead of stopping at the order page
    #[arg(long)]
    auto: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the sale start and attempt the target (default)
    Run,

    /// Watch search results and attempt whenever tickets turn buyable
    Monitor,

    /// Show current configuration (secrets masked)
    Config,

    /// Check the automation endpoint
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let directive = if cli.debug {
        "ticket_sniper=debug"
    } else {
        "ticket_sniper=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let mut config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    config.apply_overrides(cli.target_override.as_deref(), cli.auto);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let interactive = std::io::stdin().is_terminal();

    // Execute command
    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(&config, interactive).await.and_then(check_outcome),
        Commands::Monitor => commands::monitor(&config, interactive)
            .await
            .and_then(check_outcome),
        Commands::Config => commands::show_config(&config),
        Commands::Check => commands::check(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    info!("Done");
    Ok(())
}

/// Exhausted and stopped runs are normal completions; only a run that
/// could not start at all is an error
fn check_outcome(summary: RunSummary) -> Result<()> {
    match summary.outcome {
        FinalOutcome::Fatal(reason) => Err(anyhow::anyhow!("run could not start: {}", reason)),
        _ => Ok(()),
    }
}
