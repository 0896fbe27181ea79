//! Auditor CLI
//!
//! Command-line access to a durable audit ledger.
//!
//! # Commands
//!
//! - `append` - Chain and store one event
//! - `list` - Print events, newest first
//! - `verify` - Check every hash and link of a chain
//! - `version` - Print version information

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tamper-evident audit ledger tools.
#[derive(Parser)]
#[command(name = "auditor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the ledger files (default: $AUDITOR_DATA_DIR)
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Store kind: document or partitioned (default: $AUDITOR_STORE)
    #[arg(global = true, short, long)]
    store: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chain and store one event
    Append {
        /// Customer the event belongs to
        #[arg(long)]
        customer: String,

        /// Event category
        #[arg(long)]
        category: String,

        /// Event subcategory
        #[arg(long)]
        subcategory: String,

        /// Event description
        #[arg(long)]
        event: String,

        /// RFC 3339 timestamp (default: now)
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Print events, newest first
    List {
        /// Maximum number of events
        #[arg(short, long, default_value = "100")]
        limit: i64,

        /// Only events older than this RFC 3339 timestamp
        #[arg(short, long, value_parser = parse_timestamp)]
        before: Option<DateTime<Utc>>,

        /// Customer to list (required for partitioned stores)
        #[arg(short, long)]
        customer: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every hash and link of a chain
    Verify {
        /// Customer whose chain to check (required for partitioned stores)
        #[arg(short, long)]
        customer: Option<String>,
    },

    /// Show version information
    Version,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Append {
            customer,
            category,
            subcategory,
            event,
            timestamp,
        } => {
            let store = commands::open_store(cli.data_dir, cli.store.as_deref())?;
            let mut record = auditor_core::AuditEvent::new(customer, category, subcategory, event);
            record.timestamp = timestamp;
            commands::append::run(&store, record, &mut out)?;
        }
        Commands::List {
            limit,
            before,
            customer,
            format,
        } => {
            let store = commands::open_store(cli.data_dir, cli.store.as_deref())?;
            commands::list::run(&store, limit, before, customer, &format, &mut out)?;
        }
        Commands::Verify { customer } => {
            let store = commands::open_store(cli.data_dir, cli.store.as_deref())?;
            commands::verify::run(&store, customer, &mut out)?;
        }
        Commands::Version => {
            println!("Auditor CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Auditor Core v{}", auditor_core::VERSION);
        }
    }

    Ok(())
}
