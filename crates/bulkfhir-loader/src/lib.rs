//! bulkfhir loader
//!
//! Loads directories of FHIR transaction bundles into a document store and
//! rolls per-patient statistics into population fact tables.
//!
//! Each bundle is processed by one worker: every resource gets a permanent
//! id, bundle-local references are rewritten to point at those ids, the
//! resources are bulk-inserted per collection and one [`RawStat`] is stored
//! for the bundle's patient. After every worker has exited, the
//! [`facts::AggregationEngine`] builds the population, disease and
//! condition fact tables from the stored statistics.
//!
//! [`RawStat`]: ingest::stats::RawStat

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod facts;
pub mod fhir;
pub mod ingest;
pub mod loader;
pub mod lookup;
pub mod store;

pub use error::{BundleError, StoreError};
pub use loader::{Loader, RunSummary};
