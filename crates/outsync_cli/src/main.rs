//! Outsync CLI
//!
//! Command-line tools for inspecting and repairing a sync state directory.
//!
//! # Commands
//!
//! - `status` - Summarize pending markers and change tokens
//! - `queue` - List pending mutation markers
//! - `clear-queue` - Drop every pending marker
//! - `tokens` - List change tokens and disabled zones
//! - `reset-tokens` - Forget change tokens so the next pull starts over
//! - `enable-zone` - Resume syncing a zone that was deleted remotely

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Outsync state directory tools.
#[derive(Parser)]
#[command(name = "outsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync state directory
    #[arg(global = true, short, long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize pending markers and change tokens
    Status,

    /// List pending mutation markers
    Queue {
        /// Only show markers of this zone (`name@owner`)
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Drop every pending marker
    ClearQueue {
        /// Dry run - show what would be dropped
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List change tokens and disabled zones
    Tokens,

    /// Forget change tokens so the next pull fetches everything again
    ResetTokens {
        /// Only reset this zone (`name@owner`)
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Resume syncing a zone that was deleted remotely
    EnableZone {
        /// Zone to enable (`name@owner`)
        zone: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    match cli.command {
        Commands::Status => {
            let path = cli.state_dir.ok_or("State directory required for status")?;
            commands::status::run(&path, format)?;
        }
        Commands::Queue { zone } => {
            let path = cli.state_dir.ok_or("State directory required for queue")?;
            let zone = zone.as_deref().map(commands::parse_zone).transpose()?;
            commands::queue::list(&path, zone.as_ref(), format)?;
        }
        Commands::ClearQueue { dry_run } => {
            let path = cli.state_dir.ok_or("State directory required for clear-queue")?;
            commands::queue::clear(&path, dry_run, format)?;
        }
        Commands::Tokens => {
            let path = cli.state_dir.ok_or("State directory required for tokens")?;
            commands::tokens::list(&path, format)?;
        }
        Commands::ResetTokens { zone } => {
            let path = cli.state_dir.ok_or("State directory required for reset-tokens")?;
            let zone = zone.as_deref().map(commands::parse_zone).transpose()?;
            commands::tokens::reset(&path, zone.as_ref(), format)?;
        }
        Commands::EnableZone { zone } => {
            let path = cli.state_dir.ok_or("State directory required for enable-zone")?;
            let zone = commands::parse_zone(&zone)?;
            commands::tokens::enable(&path, &zone, format)?;
        }
        Commands::Version => {
            println!("outsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
