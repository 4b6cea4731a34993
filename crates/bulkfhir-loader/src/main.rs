//! bulkfhir-loader - FHIR bundle loader and fact table builder

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bulkfhir_common::logging::{init_logging, LogConfig, LogLevel};
use bulkfhir_loader::config::Config;
use bulkfhir_loader::facts::PgFactSink;
use bulkfhir_loader::ingest::IngestContext;
use bulkfhir_loader::lookup::LookupTables;
use bulkfhir_loader::store::PgDocumentStore;
use bulkfhir_loader::Loader;
use chrono::Utc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let log_level = if config.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bulkfhir-loader")
        .build()
        .with_env_overrides()?;
    let _log_guard = init_logging(&log_config)?;

    info!(
        root = %config.bundle_root.display(),
        workers = config.ingest.workers,
        queue_capacity = config.ingest.queue_capacity,
        batch_size = config.ingest.batch_size,
        reset = config.reset,
        "Starting bulkfhir loader"
    );

    let pg_pool = config.database.connect().await?;
    info!("Postgres connection pool established");

    let doc_pool = config.documents.connect().await?;
    let documents = PgDocumentStore::new(doc_pool, config.ingest.batch_size);
    documents
        .migrate()
        .await
        .context("Failed to run document store migrations")?;
    info!(database = %config.documents.database, "Document store ready");

    info!("Loading subdivision, disease and age lookup tables");
    let tables = LookupTables::load(&pg_pool).await?;
    let ctx = Arc::new(IngestContext::new(tables, Utc::now().date_naive()));

    let facts = PgFactSink::new(pg_pool);
    let loader = Loader::new(&documents, &facts, ctx, config.ingest);
    let summary = loader.run(&config.bundle_root, config.reset).await?;

    let failed = summary.aggregation.failed();
    if !failed.is_empty() {
        for kind in &failed {
            error!(pass = %kind, table = kind.table(), "Aggregation pass failed");
        }
        bail!("{} aggregation pass(es) failed", failed.len());
    }

    info!(
        bundles = summary.ingest.bundles,
        persisted = summary.ingest.pool.persisted(),
        "Load complete"
    );
    Ok(())
}
