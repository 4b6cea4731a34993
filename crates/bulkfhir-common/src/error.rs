//! Error types for bulkfhir

use thiserror::Error;

/// Result type alias for bulkfhir operations
pub type Result<T> = std::result::Result<T, BulkError>;

/// Process-level error type.
///
/// Anything surfacing as a `BulkError` stops the run before any bundle is
/// read.
#[derive(Error, Debug)]
pub enum BulkError {
    #[error("Lookup table '{table}' could not be loaded: {reason}")]
    Lookup { table: String, reason: String },
}

impl BulkError {
    pub fn lookup(table: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BulkError::Lookup {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}
