//! Bundle ingestion
//!
//! Each bundle passes through identity assignment, reference rewriting,
//! statistic extraction and batched persistence inside a single worker.

pub mod batcher;
pub mod enumerate;
pub mod identity;
pub mod pipeline;
pub mod pool;
pub mod rewrite;
pub mod stats;

pub use pipeline::{BundleHandler, BundleOutcome, BundlePipeline, IngestContext};
pub use pool::{BundleQueue, PoolReport, WorkerPool, WorkerReport};
pub use stats::{RawStat, UNMAPPED_ID};
