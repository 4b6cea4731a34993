//! Configuration management
//!
//! Every setting comes from the command line or its environment variable
//! (a `.env` file is loaded first). Defaults live in the `DEFAULT_*`
//! constants below.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::store::postgres::MAX_BATCH_SIZE;

// ============================================================================
// Defaults
// ============================================================================

/// Default number of ingestion workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Default number of bundle paths waiting in the work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of documents per insert statement.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default document store server.
pub const DEFAULT_DOCUMENT_URL: &str = "postgresql://localhost:5432";

/// Default document store database name.
pub const DEFAULT_DOCUMENT_DATABASE: &str = "fhir";

/// Document store connections beyond one per worker (reset and aggregation).
pub const DOCUMENT_POOL_HEADROOM: u32 = 2;

/// Default relational store pool size.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug, Clone)]
#[command(name = "bulkfhir-loader")]
#[command(author, version, about = "Load FHIR bundles and build population fact tables")]
pub struct Cli {
    /// Directory containing FHIR bundle files
    #[arg(short = 'p', long = "path", env = "BULKFHIR_BUNDLE_PATH")]
    pub bundle_path: PathBuf,

    /// Document store server URL
    #[arg(long = "doc-url", env = "BULKFHIR_DOCUMENT_URL", default_value = DEFAULT_DOCUMENT_URL)]
    pub document_url: String,

    /// Document store database name
    #[arg(long = "dbname", env = "BULKFHIR_DOCUMENT_DB", default_value = DEFAULT_DOCUMENT_DATABASE)]
    pub document_database: String,

    /// Document store pool size (defaults to workers + 2)
    #[arg(long = "doc-max-connections", env = "BULKFHIR_DOCUMENT_MAX_CONNECTIONS")]
    pub document_max_connections: Option<u32>,

    /// Postgres connection string for lookup and fact tables
    #[arg(long = "pgurl", env = "DATABASE_URL")]
    pub database_url: String,

    /// Number of concurrent ingestion workers
    #[arg(long, env = "BULKFHIR_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Maximum number of queued bundle paths
    #[arg(long, env = "BULKFHIR_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Documents per insert statement
    #[arg(long, env = "BULKFHIR_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Drop loader collections and truncate fact tables before loading
    #[arg(long, env = "BULKFHIR_RESET")]
    pub reset: bool,

    /// Debug logging
    #[arg(long, env = "BULKFHIR_DEBUG")]
    pub debug: bool,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub bundle_root: PathBuf,
    pub documents: DocumentStoreConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub reset: bool,
    pub debug: bool,
}

/// Document store connection
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStoreConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub database: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Relational store connection
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from the command line, environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_cli(Cli::parse());
        config.validate()?;
        Ok(config)
    }

    pub fn from_cli(cli: Cli) -> Self {
        let workers_u32 = u32::try_from(cli.workers).unwrap_or(u32::MAX);
        Config {
            bundle_root: cli.bundle_path,
            documents: DocumentStoreConfig {
                url: cli.document_url,
                database: cli.document_database,
                max_connections: cli
                    .document_max_connections
                    .unwrap_or_else(|| workers_u32.saturating_add(DOCUMENT_POOL_HEADROOM)),
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: cli.database_url,
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            ingest: IngestConfig {
                workers: cli.workers,
                queue_capacity: cli.queue_capacity,
                batch_size: cli.batch_size,
            },
            reset: cli.reset,
            debug: cli.debug,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bundle_root.as_os_str().is_empty() {
            bail!("Bundle path cannot be empty");
        }

        if self.documents.url.is_empty() {
            bail!("Document store URL cannot be empty");
        }
        if self.documents.database.is_empty() {
            bail!("Document store database name cannot be empty");
        }

        if self.database.url.is_empty() {
            bail!("Postgres connection string cannot be empty");
        }

        if self.ingest.workers == 0 {
            bail!("Worker count must be greater than 0");
        }
        if self.ingest.queue_capacity == 0 {
            bail!("Queue capacity must be greater than 0");
        }
        if self.ingest.batch_size == 0 || self.ingest.batch_size > MAX_BATCH_SIZE {
            bail!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                self.ingest.batch_size
            );
        }

        validate_pool_size(self.documents.max_connections, self.ingest.workers)?;

        Ok(())
    }
}

/// Each worker holds one document store connection for the whole run,
/// plus one more is needed for reset and aggregation.
pub fn validate_pool_size(max_connections: u32, workers: usize) -> anyhow::Result<()> {
    let required = workers.saturating_add(1);
    if (max_connections as usize) < required {
        bail!(
            "Document store pool too small: {} workers need at least {} connections, have {}",
            workers,
            required,
            max_connections
        );
    }
    Ok(())
}

impl DocumentStoreConfig {
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        Ok(PgConnectOptions::from_str(&self.url)
            .context("Invalid document store URL")?
            .database(&self.database))
    }

    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout_secs))
            .connect_with(self.connect_options()?)
            .await
            .with_context(|| format!("Failed to connect to document store '{}'", self.database))
    }
}

impl DatabaseConfig {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout_secs))
            .connect(&self.url)
            .await
            .context("Failed to connect to Postgres")
    }
}
