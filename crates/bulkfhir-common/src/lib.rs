//! bulkfhir common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error type and logging setup for the bulkfhir workspace.
//!
//! # Example
//!
//! ```no_run
//! use bulkfhir_common::logging::{init_logging, LogConfig, LogLevel};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::builder().level(LogLevel::Debug).build();
//!     let _guard = init_logging(&config.with_env_overrides()?)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BulkError, Result};
