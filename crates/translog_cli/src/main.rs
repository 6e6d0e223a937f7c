//! translog CLI
//!
//! Command-line tools for translog message logs.
//!
//! # Commands
//!
//! - `info` - Display log metadata and per-topic statistics
//! - `dump` - Print messages, optionally filtered by topic and time
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::dump::DumpOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// translog command-line tools.
#[derive(Parser)]
#[command(name = "translog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display log metadata and per-topic statistics
    Info {
        /// Path to the log file
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print messages
    Dump {
        /// Path to the log file
        path: PathBuf,

        /// Only this topic (repeatable)
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Only topics fully matching this regular expression
        #[arg(short, long)]
        pattern: Option<String>,

        /// Start time in seconds, inclusive
        #[arg(short, long)]
        begin: Option<String>,

        /// End time in seconds, exclusive
        #[arg(short, long)]
        end: Option<String>,

        /// Maximum number of messages to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { path, format } => {
            commands::info::run(&path, &format)?;
        }
        Commands::Dump {
            path,
            topics,
            pattern,
            begin,
            end,
            limit,
            format,
        } => {
            let options = DumpOptions {
                topics,
                pattern,
                begin,
                end,
                limit,
            };
            commands::dump::run(&path, &options, &format)?;
        }
        Commands::Version => {
            println!("translog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("translog core v{}", translog_core::VERSION);
            println!("log schema v{}", translog_core::SCHEMA_VERSION);
        }
    }

    Ok(())
}
