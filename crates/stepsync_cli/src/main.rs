//! stepsync CLI
//!
//! Command-line tools for stepsync step logs.
//!
//! # Commands
//!
//! - `simulate` - Run concurrent editing sessions against an in-process server
//! - `dump` - Print a document's step log
//! - `reset` - Reset a document to version 0
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// stepsync command-line tools.
#[derive(Parser)]
#[command(name = "stepsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the step store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run editing sessions against an in-process server and check convergence
    Simulate {
        /// Number of concurrent sessions
        #[arg(short, long, default_value = "3")]
        sessions: usize,

        /// Total number of local edits across all sessions
        #[arg(short, long, default_value = "60")]
        edits: usize,

        /// Seed for the random schedule
        #[arg(long)]
        seed: Option<u64>,

        /// Drive sessions with background schedulers instead of explicit cycles
        #[arg(short, long)]
        background: bool,

        /// Document id to edit
        #[arg(short, long, default_value = "sim")]
        doc: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print a document's step log, or list documents if no id is given
    Dump {
        /// Document id
        doc: Option<String>,

        /// First version to print
        #[arg(short, long, default_value = "0")]
        since: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reset a document to an empty log at version 0
    Reset {
        /// Document id
        doc: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            sessions,
            edits,
            seed,
            background,
            doc,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                sessions,
                edits,
                seed: seed.unwrap_or_else(rand::random),
                background,
                doc,
            };
            commands::simulate::run(cli.path.as_deref(), &options, &format)?;
        }
        Commands::Dump { doc, since, format } => {
            let path = cli.path.ok_or("Store path required for dump")?;
            commands::dump::run(&path, doc.as_deref(), since, &format)?;
        }
        Commands::Reset { doc } => {
            let path = cli.path.ok_or("Store path required for reset")?;
            commands::reset::run(&path, &doc)?;
        }
        Commands::Version => {
            println!("stepsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Endpoints: /collab/{{docId}}/steps, /collab/{{docId}}/reset");
        }
    }

    Ok(())
}
