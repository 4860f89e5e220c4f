//! ReviewDesk CLI - Command line interface for ReviewDesk
//!
//! Send review requests and follow their status live.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reviewdesk_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CustomerArgs, ListArgs, MarkArgs, RemoveArgs, SendArgs, StatsArgs, WatchArgs};

/// ReviewDesk: send review requests and track who has responded
#[derive(Parser, Debug)]
#[command(name = "reviewdesk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Signed-in owner id (overrides config and env)
    #[arg(long, global = true, env = "REVIEWDESK_OWNER")]
    owner: Option<String>,

    /// Path to the SQLite database (overrides config and env)
    #[arg(long, global = true, env = "REVIEWDESK_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Send a new review request
    #[command(visible_alias = "s")]
    Send(SendArgs),

    /// Stage customers and send them review requests
    #[command(visible_alias = "c")]
    Customer(CustomerArgs),

    /// List review requests
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Follow the request list live
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Mark a request as pending or reviewed
    Mark(MarkArgs),

    /// Delete a request
    #[command(visible_alias = "rm")]
    Remove(RemoveArgs),

    /// Show request counts
    Stats(StatsArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.owner.clone(), cli.database.clone())?;

    if cli.verbose {
        tracing::info!(
            owner = ?config.session.owner,
            database = ?config.database.path,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("reviewdesk {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Send(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Customer(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::List(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Watch(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Mark(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Remove(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Stats(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Config) => {
            println!("ReviewDesk Configuration");
            println!("========================");
            println!();
            println!("Session:");
            println!(
                "  owner: {}",
                config.session.owner_id().map_or("(signed out)".to_string(), |o| o.to_string())
            );
            println!();
            println!("Database:");
            match config.database_path() {
                Ok(path) => println!("  path: {}", path.display()),
                Err(e) => println!("  path: (unavailable: {})", e),
            }
            println!("  max_connections: {}", config.database.max_connections);
            println!();
            println!("Sync:");
            println!("  fetch_timeout: {:?}", config.sync.fetch_timeout);
            println!("  write_timeout: {:?}", config.sync.write_timeout);
            println!("  feed_buffer: {}", config.sync.feed_buffer);
            println!("  refresh_interval: {:?}", config.sync.refresh_interval);
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        None => {
            println!("ReviewDesk - Send review requests and track responses");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
