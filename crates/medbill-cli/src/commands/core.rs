//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_pipeline` - Shared utility to load detection config
//! - `cmd_init` - Initialize the database
//! - `cmd_formats` - List known report formats

use std::path::Path;

use anyhow::{Context, Result};
use medbill_core::{db::Database, DetectionConfig, ImportPipeline};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load detection config (explicit file, user override, or built-in) and build the pipeline
pub fn load_pipeline(config_path: Option<&Path>) -> Result<ImportPipeline> {
    let config = DetectionConfig::load(config_path).context("Failed to load detection config")?;
    tracing::debug!(
        "Detection config: threshold {}, {} extra alias set(s)",
        config.confidence_threshold,
        config.extra_aliases.len()
    );
    Ok(ImportPipeline::new(config))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Check a report: medbill detect --file payments.csv");
    println!("  2. Import it: medbill import --file payments.csv");

    Ok(())
}

pub fn cmd_formats(pipeline: &ImportPipeline) -> Result<()> {
    let config = pipeline.config();

    println!();
    println!("📋 Known Report Formats");
    println!("   ─────────────────────────────────────────────────────────────");

    for format in pipeline.registry().iter() {
        println!("   {} ({})", format.label, format.id);

        let required: Vec<&str> = format.required_fields().map(|f| f.as_str()).collect();
        let optional: Vec<&str> = format.optional_fields().map(|f| f.as_str()).collect();
        println!("      Required: {}", required.join(", "));
        if !optional.is_empty() {
            println!("      Optional: {}", optional.join(", "));
        }
        if !format.fill_down.is_empty() {
            let filled: Vec<&str> = format.fill_down.iter().map(|f| f.as_str()).collect();
            println!("      Filled down: {}", filled.join(", "));
        }
        println!("      Example headers: {}", format.example_headers.join(", "));
        println!();
    }

    println!(
        "   Confidence threshold: {:.0} (sampling {} rows)",
        config.confidence_threshold, config.sample_rows
    );
    if !config.extra_aliases.is_empty() {
        println!(
            "   Extra aliases from config: {} field(s)",
            config.extra_aliases.len()
        );
    }

    Ok(())
}
