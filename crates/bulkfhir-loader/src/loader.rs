//! Run orchestration
//!
//! reset (optional) → ingest every bundle under the root → wait for the
//! pool to drain → population, disease and condition passes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::facts::{AggregationEngine, AggregationReport, FactKind, FactSink};
use crate::ingest::enumerate::spawn_enumerator;
use crate::ingest::{BundlePipeline, IngestContext, PoolReport, WorkerPool};
use crate::store::{DocumentStore, LOADER_COLLECTIONS};

/// Ingestion totals
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    /// Bundle files found and queued
    pub bundles: u64,
    pub pool: PoolReport,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
pub struct RunSummary {
    pub ingest: IngestSummary,
    pub aggregation: AggregationReport,
}

pub struct Loader<'a, D, F> {
    documents: &'a D,
    facts: &'a F,
    ctx: Arc<IngestContext>,
    settings: IngestConfig,
}

impl<'a, D, F> Loader<'a, D, F>
where
    D: DocumentStore,
    F: FactSink,
{
    pub fn new(documents: &'a D, facts: &'a F, ctx: Arc<IngestContext>, settings: IngestConfig) -> Self {
        Self {
            documents,
            facts,
            ctx,
            settings,
        }
    }

    /// Drops the loader's collections and empties the fact tables.
    /// Failures are logged and do not stop the run.
    pub async fn reset(&self) {
        info!(collections = LOADER_COLLECTIONS.len(), "Resetting document collections");
        if let Err(e) = self.documents.drop_collections(LOADER_COLLECTIONS).await {
            warn!(error = %e, "Failed to drop document collections");
        }

        for kind in FactKind::ALL {
            if let Err(e) = self.facts.truncate(kind).await {
                warn!(table = kind.table(), error = %e, "Failed to truncate fact table");
            }
        }
    }

    /// Loads every bundle under `root` and waits for the pool to drain
    pub async fn ingest(&self, root: &Path) -> Result<IngestSummary> {
        let start = Instant::now();
        info!(root = %root.display(), workers = self.settings.workers, "Reading FHIR bundles");

        let mut handlers = Vec::with_capacity(self.settings.workers);
        for _ in 0..self.settings.workers {
            let session = self
                .documents
                .open_session()
                .await
                .context("Failed to open document store session")?;
            handlers.push(BundlePipeline::new(Arc::clone(&self.ctx), session));
        }

        let (queue, pool) = WorkerPool::spawn(handlers, self.settings.queue_capacity);
        let enumerated = spawn_enumerator(root.to_path_buf(), queue).await;
        let report = pool.join().await;

        let bundles = enumerated
            .context("Bundle enumeration task panicked")?
            .context("An error occurred while reading FHIR bundles")?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            bundles,
            persisted = report.persisted(),
            rejected = report.rejected(),
            failed = report.failed(),
            stats = report.stats_written(),
            resources = report.resources_written(),
            elapsed_secs,
            "FHIR bundles read"
        );

        Ok(IngestSummary {
            bundles,
            pool: report,
            elapsed_secs,
        })
    }

    pub async fn aggregate(&self) -> AggregationReport {
        AggregationEngine::new(self.documents, self.facts)
            .run_all()
            .await
    }

    /// Full run. Aggregation starts only after every worker has exited.
    pub async fn run(&self, root: &Path, reset: bool) -> Result<RunSummary> {
        let start = Instant::now();
        if reset {
            self.reset().await;
        }

        let ingest = self.ingest(root).await?;
        let aggregation = self.aggregate().await;

        info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            failed_passes = aggregation.failed().len(),
            "Run finished"
        );
        Ok(RunSummary {
            ingest,
            aggregation,
        })
    }
}
