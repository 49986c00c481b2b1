//! Error types for sqlsheet

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sqlsheet operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export, seeding and compression
#[derive(Error, Debug)]
pub enum ExportError {
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver produced a value that does not fit the declared column type
    #[error("column '{column}' declared as {type_name} expected {expected}")]
    ValueMismatch {
        column: String,
        type_name: String,
        expected: &'static str,
    },

    /// A row does not have one value per column
    #[error("row has {actual} values but the result has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    /// Error occurred while writing the spreadsheet
    #[error("Failed to write spreadsheet: {0}")]
    Write(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Compressing a file failed
    #[error("gzip {path}: {source}")]
    Gzip {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error reported by the database collaborator
    #[error("Database error: {0}")]
    Database(String),
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for ExportError {
    fn from(err: postgres::Error) -> Self {
        ExportError::Database(err.to_string())
    }
}
