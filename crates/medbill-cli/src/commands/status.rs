//! Status-related command implementations (status, uploads, issues)

use std::path::Path;

use anyhow::Result;
use medbill_core::{db::Database, models::IssueSeverity};

use super::open_db;

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use medbill_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 Medbill Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(stats) = db.stats() {
                    println!();
                    println!("   Uploads: {}", stats.uploads);
                    println!("   Payments: {}", stats.payments);
                    println!("   Providers: {}", stats.providers);
                    println!("   Rejected rows: {}", stats.failed_rows);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_uploads(db: &Database, limit: i64) -> Result<()> {
    let uploads = db.list_uploads(limit)?;

    if uploads.is_empty() {
        println!("No uploads yet. Import a report with:");
        println!("  medbill import --file payments.csv");
        return Ok(());
    }

    println!();
    println!("📁 Uploads");
    println!("   ─────────────────────────────────────────────────────────────");

    for upload in uploads {
        let format = upload.format_id.map(|f| f.as_str()).unwrap_or("manual");
        println!(
            "   #{} {} [{}] {}",
            upload.id,
            upload.filename,
            format,
            upload.created_at.format("%Y-%m-%d %H:%M")
        );
        println!(
            "      {} of {} rows imported ({}, confidence {:.1})",
            upload.rows_succeeded, upload.rows_processed, upload.status, upload.confidence
        );
    }

    Ok(())
}

pub fn cmd_issues(db: &Database, upload_id: i64) -> Result<()> {
    let upload = db
        .get_upload(upload_id)?
        .ok_or_else(|| anyhow::anyhow!("Upload not found: {}", upload_id))?;
    let issues = db.list_upload_issues(upload_id)?;

    if issues.is_empty() {
        println!("✅ Upload #{} ({}) imported cleanly.", upload.id, upload.filename);
        return Ok(());
    }

    println!();
    println!("⚠️  Issues for upload #{} ({})", upload.id, upload.filename);
    println!("   ─────────────────────────────────────────────────────────────");

    for issue in &issues {
        let icon = match issue.severity {
            IssueSeverity::Error => "❌",
            IssueSeverity::Warning => "⚠️ ",
        };
        println!("   {} row {}: {}", icon, issue.row_index + 1, issue.description);
    }

    Ok(())
}
