//! Medbill CLI - Billing report detection and import
//!
//! Usage:
//!   medbill init                  Initialize database
//!   medbill detect --file CSV     Show which report format a file matches
//!   medbill import --file CSV     Import a report (auto-detects the format)
//!   medbill uploads               Show import history

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Formats => {
            let pipeline = commands::load_pipeline(cli.config.as_deref())?;
            commands::cmd_formats(&pipeline)
        }
        Commands::Detect { file, json } => {
            let pipeline = commands::load_pipeline(cli.config.as_deref())?;
            commands::cmd_detect(&pipeline, &file, json)
        }
        Commands::Import {
            file,
            format,
            maps,
            dry_run,
            force,
        } => {
            let pipeline = commands::load_pipeline(cli.config.as_deref())?;
            let db = if dry_run {
                None
            } else {
                Some(commands::open_db(&cli.db, cli.no_encrypt)?)
            };
            commands::cmd_import(
                db.as_ref(),
                &pipeline,
                &file,
                format.as_deref(),
                &maps,
                force,
            )
        }
        Commands::Uploads { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_uploads(&db, limit)
        }
        Commands::Issues { upload } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_issues(&db, upload)
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
    }
}
