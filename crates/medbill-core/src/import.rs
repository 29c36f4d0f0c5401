//! CSV import pipeline: read, detect, transform, store

use std::io::Read;

use csv::ReaderBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::db::Database;
use crate::detect::FormatDetector;
use crate::error::{Error, Result};
use crate::formats::FormatRegistry;
use crate::models::{
    CanonicalRow, ColumnMapping, DetectionResult, FormatId, NewUpload, RawTable,
    TransformationReport,
};
use crate::transform::ReportTransformer;

/// Read a CSV export into a [`RawTable`]
///
/// Rows may be shorter or longer than the header row. Rows with every cell
/// blank are dropped.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }

    debug!("Read {} columns, {} rows", headers.len(), rows.len());
    Ok(RawTable { headers, rows })
}

/// SHA-256 fingerprint of a file's bytes (hex)
pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Caller overrides for one import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Skip detection and use this format
    pub format: Option<FormatId>,
    /// Use this mapping instead of the detected one
    pub mapping: Option<ColumnMapping>,
}

/// A file that has been detected and transformed but not yet stored
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub source: String,
    pub file_hash: String,
    pub file_size_bytes: i64,
    pub detection: DetectionResult,
    pub rows: Vec<CanonicalRow>,
    pub report: TransformationReport,
}

impl PreparedImport {
    pub fn new_upload(&self) -> NewUpload {
        NewUpload {
            filename: self.source.clone(),
            file_hash: self.file_hash.clone(),
            file_size_bytes: Some(self.file_size_bytes),
        }
    }
}

/// Detection and transformation with one registry and configuration
pub struct ImportPipeline {
    registry: FormatRegistry,
    config: DetectionConfig,
}

impl ImportPipeline {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            registry: FormatRegistry::with_config(&config),
            config,
        }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect a table's format, or score the forced one
    pub fn detect(
        &self,
        table: &RawTable,
        source: &str,
        format: Option<FormatId>,
    ) -> Result<DetectionResult> {
        let detector = FormatDetector::new(&self.registry, &self.config);
        let samples = table.samples(self.config.sample_rows);

        let mut detection = match format {
            Some(format_id) => detector.detect_as(format_id, &table.headers, samples)?,
            None => detector.detect(&table.headers, samples),
        };
        detection.source = Some(source.to_string());
        Ok(detection)
    }

    /// Detect and transform a file's contents
    pub fn prepare(
        &self,
        bytes: &[u8],
        source: &str,
        options: &ImportOptions,
    ) -> Result<PreparedImport> {
        let table = read_csv(bytes)?;
        let detection = self.detect(&table, source, options.format)?;

        info!(
            "{}: detected {} (confidence {:.1})",
            source,
            detection.format_name(),
            detection.confidence
        );

        let output = ReportTransformer::new(&self.registry).transform(
            &table,
            &detection,
            options.mapping.as_ref(),
        )?;

        Ok(PreparedImport {
            source: source.to_string(),
            file_hash: file_hash(bytes),
            file_size_bytes: bytes.len() as i64,
            detection,
            rows: output.rows,
            report: output.report,
        })
    }

    /// Store a prepared import in one transaction
    ///
    /// A file whose hash is already stored is refused unless `force` is set.
    pub fn store(&self, db: &Database, prepared: &PreparedImport, force: bool) -> Result<i64> {
        if !force {
            if let Some(existing) = db.find_upload_by_hash(&prepared.file_hash)? {
                return Err(Error::DuplicateUpload {
                    upload_id: existing.id,
                    filename: existing.filename,
                });
            }
        }

        db.store_import(&prepared.new_upload(), &prepared.rows, &prepared.report)
    }
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalField;

    const INSURANCE_CSV: &str = "\u{feff}RowId,Check Date,Date Posted,Check Number,Payment From,Reference,Check Amount,Cash Applied,Provider\n\
        1,01/15/2024,01/16/2024,1001,BCBS,ERA 1,\"$1,250.00\",$250.00,Dr. Smith\n\
        2,,,,,Sess: 01/10,,$100.00,Dr. Smith\n\
        ,,,,,,,,\n\
        3,01/17/2024,01/18/2024,1002,Aetna,ERA 2,80.00,,Dr. Jones\n";

    #[test]
    fn test_read_csv() {
        let table = read_csv(INSURANCE_CSV.as_bytes()).unwrap();
        assert_eq!(table.headers.len(), 9);
        assert_eq!(table.headers[0], "RowId");
        // Blank row dropped
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][6], "$1,250.00");
    }

    #[test]
    fn test_read_csv_flexible_rows() {
        let table = read_csv("a,b,c\n1,2\n1,2,3,4\n".as_bytes()).unwrap();
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.rows[1].len(), 4);
    }

    #[test]
    fn test_file_hash() {
        let hash = file_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, file_hash(b"hello"));
        assert_ne!(hash, file_hash(b"hello "));
    }

    #[test]
    fn test_prepare() {
        let pipeline = ImportPipeline::default();
        let prepared = pipeline
            .prepare(INSURANCE_CSV.as_bytes(), "payments.csv", &ImportOptions::default())
            .unwrap();

        assert_eq!(prepared.detection.format_id, Some(FormatId::InsuranceClaims));
        assert_eq!(prepared.detection.source.as_deref(), Some("payments.csv"));
        assert_eq!(prepared.report.rows_processed, 3);
        assert_eq!(prepared.report.rows_succeeded, 2);
        assert_eq!(prepared.report.rows_failed, 1);
        assert_eq!(prepared.file_hash, file_hash(INSURANCE_CSV.as_bytes()));
    }

    #[test]
    fn test_prepare_forced_format() {
        let pipeline = ImportPipeline::default();
        let options = ImportOptions {
            format: Some(FormatId::PracticeExpenses),
            mapping: None,
        };
        let prepared = pipeline
            .prepare(INSURANCE_CSV.as_bytes(), "payments.csv", &options)
            .unwrap();

        assert_eq!(prepared.detection.format_id, Some(FormatId::PracticeExpenses));
        // No category column: every row fails
        assert_eq!(prepared.report.rows_succeeded, 0);
    }

    #[test]
    fn test_prepare_unknown_without_mapping() {
        let pipeline = ImportPipeline::default();
        let err = pipeline
            .prepare(b"foo,bar\n1,2\n", "mystery.csv", &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFormat { .. }));

        let options = ImportOptions {
            format: None,
            mapping: Some(ColumnMapping::manual([
                ("foo", CanonicalField::TransactionDate),
                ("bar", CanonicalField::CashApplied),
            ])),
        };
        let prepared = pipeline
            .prepare(b"foo,bar\n2024-02-01,2\n", "mystery.csv", &options)
            .unwrap();
        assert_eq!(prepared.rows.len(), 1);
    }

    #[test]
    fn test_store_refuses_duplicate_file() {
        let db = Database::in_memory().unwrap();
        let pipeline = ImportPipeline::default();
        let prepared = pipeline
            .prepare(INSURANCE_CSV.as_bytes(), "payments.csv", &ImportOptions::default())
            .unwrap();

        let upload_id = pipeline.store(&db, &prepared, false).unwrap();
        let err = pipeline.store(&db, &prepared, false).unwrap_err();
        assert!(
            matches!(err, Error::DuplicateUpload { upload_id: existing, .. } if existing == upload_id)
        );

        let forced = pipeline.store(&db, &prepared, true).unwrap();
        assert_ne!(forced, upload_id);
    }
}
