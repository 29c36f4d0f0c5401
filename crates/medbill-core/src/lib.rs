//! Medbill Core Library
//!
//! Shared functionality for the medbill billing import tool:
//! - Registry of known practice-management report layouts
//! - Header-based format detection with confidence scoring
//! - Transformation of raw CSV rows into the canonical billing schema
//! - Detection configuration (thresholds, weights, extra header aliases)
//! - Encrypted database storage of uploads, canonical rows and row issues

pub mod config;
pub mod convert;
pub mod db;
pub mod detect;
pub mod error;
pub mod formats;
pub mod import;
pub mod models;
pub mod transform;

pub use config::{DetectionConfig, ExtraAliases};
pub use db::Database;
pub use detect::FormatDetector;
pub use error::{Error, Result};
pub use formats::{FieldSpec, FormatDefinition, FormatRegistry};
pub use import::{file_hash, read_csv, ImportOptions, ImportPipeline, PreparedImport};
pub use models::{
    CanonicalField, CanonicalRow, ColumnMapping, DetectionResult, FailureReason, FormatId,
    PaymentType, QualityNote, RawTable, RowFailure, TransformOutput, TransformationReport,
};
pub use transform::ReportTransformer;
