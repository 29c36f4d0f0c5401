//! Format detection command

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use medbill_core::{read_csv, ImportPipeline};

pub fn cmd_detect(pipeline: &ImportPipeline, file: &Path, json: bool) -> Result<()> {
    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let table = read_csv(csv_file).context("Failed to read CSV")?;

    let source = file.display().to_string();
    let detection = pipeline.detect(&table, &source, None)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
        return Ok(());
    }

    println!("🔍 {} ({} data rows)", file.display(), table.rows.len());
    println!();
    print!("{}", detection.summary());

    if detection.candidates.len() > 1 {
        println!("Candidates:");
        for candidate in &detection.candidates {
            println!(
                "  {:<22} {:>5.1}",
                candidate.format_id.as_str(),
                candidate.confidence
            );
        }
    }

    println!();
    if detection.is_unknown() {
        println!(
            "⚠️  No format reached the confidence threshold ({:.0}).",
            pipeline.config().confidence_threshold
        );
        println!("   Import with an explicit mapping, e.g.:");
        println!(
            "   medbill import --file {} --map \"Check Date=transaction_date\" --map \"Amount=cash_applied\"",
            file.display()
        );
    } else {
        println!(
            "✅ Ready to import: medbill import --file {}",
            file.display()
        );
    }

    Ok(())
}
