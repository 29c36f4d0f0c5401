//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Medbill - Import practice billing reports into one canonical ledger
#[derive(Parser)]
#[command(name = "medbill")]
#[command(about = "Detects and imports medical billing CSV reports", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "medbill.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set MEDBILL_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Detection config file (defaults to ~/.local/share/medbill/config/detection.toml,
    /// then the built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// List the report formats medbill recognizes
    Formats,

    /// Detect a CSV report's format without importing it
    Detect {
        /// CSV file to inspect
        #[arg(short, long)]
        file: PathBuf,

        /// Print the detection result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a CSV report
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Report format (auto-detected if not specified)
        #[arg(long)]
        format: Option<String>,

        /// Explicit column mapping, e.g. --map "Check Date=transaction_date"
        /// (repeatable; replaces the detected mapping)
        #[arg(short, long = "map", value_name = "HEADER=FIELD")]
        maps: Vec<String>,

        /// Detect and transform, but don't store anything
        #[arg(long)]
        dry_run: bool,

        /// Import even if this exact file was imported before
        #[arg(long)]
        force: bool,
    },

    /// Show import history
    Uploads {
        /// Maximum number of uploads to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show rejected rows and quality notes for an upload
    Issues {
        /// Upload ID
        #[arg(short, long)]
        upload: i64,
    },

    /// Show database status
    Status,
}
