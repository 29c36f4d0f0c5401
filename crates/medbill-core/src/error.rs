//! Error types for medbill
//!
//! Row-level conversion problems are not errors: they are recorded in the
//! [`TransformationReport`](crate::models::TransformationReport). Only
//! structural failures surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report format not recognized (best confidence {confidence:.1}); supply an explicit column mapping")]
    UnknownFormat { confidence: f64 },

    #[error("Column mapping error: {0}")]
    FatalMapping(String),

    #[error("File already imported as upload {upload_id} ({filename})")]
    DuplicateUpload { upload_id: i64, filename: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
