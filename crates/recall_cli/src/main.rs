//! Recall CLI
//!
//! Command-line tools for the Recall store.
//!
//! # Commands
//!
//! - `sync` - One full bidirectional sync pass against a remote server
//! - `inspect` - Display store statistics and schema version

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Recall command-line store tools.
#[derive(Parser)]
#[command(name = "recall")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store file
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform one full bidirectional sync pass and exit
    Sync {
        /// Base URL of the remote server
        #[arg(long)]
        server: String,

        /// Peer name used to key the persisted checkpoints
        #[arg(long, default_value = "remote")]
        peer: String,

        /// Events pulled per round trip
        #[arg(long, default_value = "100")]
        receive_batch_size: usize,

        /// Events pushed per round trip
        #[arg(long, default_value = "100")]
        send_batch_size: usize,

        /// Retry attempts for transient failures
        #[arg(long, default_value = "3")]
        retries: u32,
    },

    /// Display store statistics and schema version
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            server,
            peer,
            receive_batch_size,
            send_batch_size,
            retries,
        } => {
            let store = cli.store.ok_or("Store path required for sync")?;
            commands::sync::run(
                &store,
                &server,
                &peer,
                receive_batch_size,
                send_batch_size,
                retries,
            )?;
        }
        Commands::Inspect { format } => {
            let store = cli.store.ok_or("Store path required for inspect")?;
            commands::inspect::run(&store, &format)?;
        }
        Commands::Version => {
            println!("recall {}", recall_core::VERSION);
        }
    }

    Ok(())
}
