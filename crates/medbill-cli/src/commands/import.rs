//! Import command implementation

use std::path::Path;

use anyhow::{Context, Result};
use medbill_core::{
    db::Database, ColumnMapping, Error, FormatId, ImportOptions, ImportPipeline, PreparedImport,
};

/// Import a CSV report
///
/// With no database (`--dry-run`) the file is detected and transformed but
/// nothing is stored.
pub fn cmd_import(
    db: Option<&Database>,
    pipeline: &ImportPipeline,
    file: &Path,
    format_str: Option<&str>,
    maps: &[String],
    force: bool,
) -> Result<()> {
    let format: Option<FormatId> = format_str
        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .transpose()?;
    let mapping = if maps.is_empty() {
        None
    } else {
        Some(ColumnMapping::parse_assignments(maps)?)
    };

    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    println!("📥 Importing {}...", file.display());

    let options = ImportOptions { format, mapping };
    let prepared = match pipeline.prepare(&bytes, &source, &options) {
        Ok(prepared) => prepared,
        Err(Error::UnknownFormat { confidence }) => {
            println!(
                "   ❌ Could not recognize this report (best confidence {:.1})",
                confidence
            );
            println!("   Run 'medbill detect --file {}' to see candidates,", file.display());
            println!("   then pass --format or --map \"Header=field\" to import it.");
            anyhow::bail!("Unknown report format");
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&prepared);

    let Some(db) = db else {
        println!();
        println!("💡 Dry run: nothing stored");
        return Ok(());
    };

    match pipeline.store(db, &prepared, force) {
        Ok(upload_id) => {
            println!();
            println!("✅ Import complete! (upload #{})", upload_id);
            if prepared.report.rows_failed > 0 || !prepared.report.quality_notes.is_empty() {
                println!("   Run 'medbill issues --upload {}' to review", upload_id);
            }
            Ok(())
        }
        Err(Error::DuplicateUpload {
            upload_id,
            filename,
        }) => {
            println!();
            println!(
                "   ⚠️  This file was already imported as upload #{} ({})",
                upload_id, filename
            );
            println!("   Use --force to import it again.");
            anyhow::bail!("Duplicate upload");
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(prepared: &PreparedImport) {
    let detection = &prepared.detection;
    let report = &prepared.report;

    println!(
        "   Format: {} (confidence {:.1})",
        detection.format_name(),
        detection.confidence
    );
    println!("   Rows processed: {}", report.rows_processed);
    println!("   Rows imported: {}", report.rows_succeeded);
    if report.rows_failed > 0 {
        println!("   Rows rejected: {}", report.rows_failed);
        for failure in &report.failures {
            println!("      row {}: {}", failure.row_index + 1, failure.reason);
        }
    }
    if !report.quality_notes.is_empty() {
        println!("   Quality notes: {}", report.quality_notes.len());
        for note in &report.quality_notes {
            println!("      row {}: {}", note.row_index + 1, note);
        }
    }
}
