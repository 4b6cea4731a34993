//! Loader error types
//!
//! `StoreError` covers both store boundaries (documents and facts).
//! `BundleError` classifies why a single bundle did not make it into the
//! document store; the worker pool logs it and moves on.

use std::path::PathBuf;
use thiserror::Error;

use crate::ingest::rewrite::UnresolvedReference;

/// Errors raised by the document store or the fact sink
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store rejected write to '{collection}': {reason}")]
    Rejected { collection: String, reason: String },
}

/// Why a bundle was skipped
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Failed to read bundle {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse bundle: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{} reference(s) could not be resolved, first: {}", .0.len(), first_reference(.0))]
    UnresolvedReferences(Vec<UnresolvedReference>),

    #[error("Failed to persist '{collection}': {source}")]
    Persist {
        collection: String,
        #[source]
        source: StoreError,
    },
}

impl BundleError {
    /// Rejections are bundles that parsed but were refused on integrity grounds.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BundleError::UnresolvedReferences(_))
    }
}

fn first_reference(unresolved: &[UnresolvedReference]) -> &str {
    unresolved
        .first()
        .map(|u| u.reference.as_str())
        .unwrap_or("<none>")
}
