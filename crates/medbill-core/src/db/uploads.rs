//! Upload operations

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{
    CanonicalRow, IssueSeverity, NewUpload, TransformationReport, Upload, UploadIssue,
    UploadStatus,
};

const UPLOAD_COLUMNS: &str = "id, filename, file_hash, file_size_bytes, format_id, confidence, \
     rows_processed, rows_succeeded, rows_failed, status, created_at";

impl Database {
    /// Store one transformed file atomically
    ///
    /// Writes the upload record, upserts providers, and inserts every canonical
    /// row, failure and quality note in a single transaction: either the whole
    /// file lands or nothing does.
    pub fn store_import(
        &self,
        upload: &NewUpload,
        rows: &[CanonicalRow],
        report: &TransformationReport,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let status = if report.rows_failed > 0 {
            UploadStatus::Partial
        } else {
            UploadStatus::Completed
        };

        tx.execute(
            r#"
            INSERT INTO uploads (filename, file_hash, file_size_bytes, format_id, confidence,
                                 rows_processed, rows_succeeded, rows_failed, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                upload.filename,
                upload.file_hash,
                upload.file_size_bytes,
                report.format_id.map(|f| f.as_str()),
                report.confidence,
                report.rows_processed as i64,
                report.rows_succeeded as i64,
                report.rows_failed as i64,
                status.as_str(),
            ],
        )?;
        let upload_id = tx.last_insert_rowid();

        {
            let mut upsert_provider = tx.prepare_cached(
                "INSERT INTO providers (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            )?;
            let mut provider_id = tx.prepare_cached("SELECT id FROM providers WHERE name = ?")?;
            let mut insert_row = tx.prepare_cached(
                r#"
                INSERT INTO payment_transactions (
                    upload_id, provider_id, source_row, format_id, payment_type, row_id,
                    transaction_date, posted_date, check_number, payer_name, reference,
                    check_amount, cash_applied, fee_amount, net_amount,
                    patient_name, card_type, category
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;

            for row in rows {
                let provider: Option<i64> = match &row.provider {
                    Some(name) => {
                        upsert_provider.execute(params![name])?;
                        Some(provider_id.query_row(params![name], |r| r.get(0))?)
                    }
                    None => None,
                };

                insert_row.execute(params![
                    upload_id,
                    provider,
                    row.source_row as i64,
                    row.format_id.map(|f| f.as_str()),
                    row.payment_type.map(|p| p.as_str()),
                    row.row_id,
                    row.transaction_date.to_string(),
                    row.posted_date.map(|d| d.to_string()),
                    row.check_number,
                    row.payer_name,
                    row.reference,
                    row.check_amount.map(|a| a.to_string()),
                    row.cash_applied.to_string(),
                    row.fee_amount.map(|a| a.to_string()),
                    row.net_amount.map(|a| a.to_string()),
                    row.patient_name,
                    row.card_type,
                    row.category,
                ])?;
            }

            let mut insert_issue = tx.prepare_cached(
                r#"
                INSERT INTO upload_issues (upload_id, row_index, issue_type, field, description, severity)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;

            for failure in &report.failures {
                insert_issue.execute(params![
                    upload_id,
                    failure.row_index as i64,
                    failure.reason.as_str(),
                    failure.reason.field().as_str(),
                    failure.reason.to_string(),
                    IssueSeverity::Error.as_str(),
                ])?;
            }
            for note in &report.quality_notes {
                insert_issue.execute(params![
                    upload_id,
                    note.row_index as i64,
                    note.kind.as_str(),
                    note.field.as_str(),
                    note.to_string(),
                    IssueSeverity::Warning.as_str(),
                ])?;
            }
        }

        tx.commit()?;

        info!(
            "Stored upload {} ({}): {} rows, {} failed, {} notes",
            upload_id,
            upload.filename,
            rows.len(),
            report.failures.len(),
            report.quality_notes.len()
        );
        Ok(upload_id)
    }

    /// Most recent upload of a file with this content hash
    pub fn find_upload_by_hash(&self, file_hash: &str) -> Result<Option<Upload>> {
        let conn = self.conn()?;
        let upload = conn
            .query_row(
                &format!(
                    "SELECT {} FROM uploads WHERE file_hash = ? ORDER BY id DESC LIMIT 1",
                    UPLOAD_COLUMNS
                ),
                params![file_hash],
                Self::map_upload_row,
            )
            .optional()?;
        Ok(upload)
    }

    /// Get an upload by ID
    pub fn get_upload(&self, id: i64) -> Result<Option<Upload>> {
        let conn = self.conn()?;
        let upload = conn
            .query_row(
                &format!("SELECT {} FROM uploads WHERE id = ?", UPLOAD_COLUMNS),
                params![id],
                Self::map_upload_row,
            )
            .optional()?;
        Ok(upload)
    }

    /// List uploads, newest first
    pub fn list_uploads(&self, limit: i64) -> Result<Vec<Upload>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM uploads ORDER BY id DESC LIMIT ?",
            UPLOAD_COLUMNS
        ))?;

        let uploads = stmt
            .query_map(params![limit], Self::map_upload_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(uploads)
    }

    /// Failures and quality notes stored for an upload, in row order
    pub fn list_upload_issues(&self, upload_id: i64) -> Result<Vec<UploadIssue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, upload_id, row_index, issue_type, field, description, severity
            FROM upload_issues
            WHERE upload_id = ?
            ORDER BY row_index, id
            "#,
        )?;

        let issues = stmt
            .query_map(params![upload_id], |row| {
                let severity: String = row.get(6)?;
                Ok(UploadIssue {
                    id: row.get(0)?,
                    upload_id: row.get(1)?,
                    row_index: row.get(2)?,
                    issue_type: row.get(3)?,
                    field: row.get(4)?,
                    description: row.get(5)?,
                    severity: severity.parse().unwrap_or(IssueSeverity::Error),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(issues)
    }

    fn map_upload_row(row: &Row) -> rusqlite::Result<Upload> {
        let format_str: Option<String> = row.get(4)?;
        let status_str: String = row.get(9)?;
        let created_at_str: String = row.get(10)?;

        Ok(Upload {
            id: row.get(0)?,
            filename: row.get(1)?,
            file_hash: row.get(2)?,
            file_size_bytes: row.get(3)?,
            format_id: format_str.and_then(|s| s.parse().ok()),
            confidence: row.get(5)?,
            rows_processed: row.get(6)?,
            rows_succeeded: row.get(7)?,
            rows_failed: row.get(8)?,
            status: status_str.parse().unwrap_or(UploadStatus::Completed),
            created_at: parse_datetime(&created_at_str),
        })
    }
}
