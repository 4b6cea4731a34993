//! Per-bundle pipeline
//!
//! read → parse → assign identifiers → rewrite references → extract
//! statistic → persist. A bundle with any unresolved same-bundle
//! reference is rejected before anything is written.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::BundleError;
use crate::fhir::Bundle;
use crate::ingest::batcher::persist_bundle;
use crate::ingest::identity::assign_identifiers;
use crate::ingest::rewrite::rewrite_references;
use crate::ingest::stats::StatExtractor;
use crate::lookup::LookupTables;
use crate::store::DocumentSession;

/// Read-only state shared by every worker
#[derive(Debug)]
pub struct IngestContext {
    pub tables: LookupTables,
    /// Date ages are computed against
    pub as_of: NaiveDate,
}

impl IngestContext {
    pub fn new(tables: LookupTables, as_of: NaiveDate) -> Self {
        Self { tables, as_of }
    }

    pub fn extractor(&self) -> StatExtractor<'_> {
        StatExtractor::new(&self.tables, self.as_of)
    }
}

/// Result of a successfully persisted bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BundleOutcome {
    pub resources: u64,
    pub stat_written: bool,
}

/// Processes one bundle path end to end
#[async_trait]
pub trait BundleHandler: Send + 'static {
    async fn handle(&mut self, path: &Path) -> Result<BundleOutcome, BundleError>;
}

/// Worker-owned pipeline: shared context plus a private store session
pub struct BundlePipeline<S> {
    ctx: Arc<IngestContext>,
    session: S,
}

impl<S: DocumentSession> BundlePipeline<S> {
    pub fn new(ctx: Arc<IngestContext>, session: S) -> Self {
        Self { ctx, session }
    }

    pub async fn process_bytes(&mut self, bytes: &[u8]) -> Result<BundleOutcome, BundleError> {
        let bundle = Bundle::from_slice(bytes)?;
        self.process_bundle(bundle).await
    }

    pub async fn process_bundle(&mut self, mut bundle: Bundle) -> Result<BundleOutcome, BundleError> {
        let ids = assign_identifiers(&mut bundle.entry);
        let report = rewrite_references(&mut bundle.entry, &ids);
        if !report.is_clean() {
            for unresolved in &report.unresolved {
                warn!(
                    entry = unresolved.entry.as_deref().unwrap_or(""),
                    reference = %unresolved.reference,
                    "Unresolved bundle reference"
                );
            }
            return Err(BundleError::UnresolvedReferences(report.unresolved));
        }
        debug!(
            entries = bundle.entry.len(),
            rewritten = report.rewritten,
            "References rewritten"
        );

        let resources = bundle.into_resources();
        let stat = self.ctx.extractor().extract(&resources);
        let summary = persist_bundle(&mut self.session, resources, stat.as_ref()).await?;

        Ok(BundleOutcome {
            resources: summary.resources,
            stat_written: summary.stat_written,
        })
    }
}

#[async_trait]
impl<S: DocumentSession + 'static> BundleHandler for BundlePipeline<S> {
    async fn handle(&mut self, path: &Path) -> Result<BundleOutcome, BundleError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| BundleError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.process_bytes(&bytes).await
    }
}
