//! Bulk persistence of one bundle
//!
//! Resources are grouped by collection and written with one unordered
//! bulk insert per collection, followed by the bundle's raw statistic.
//! The first failed write aborts the rest of the bundle.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{BundleError, StoreError};
use crate::fhir::Resource;
use crate::ingest::identity::new_permanent_id;
use crate::ingest::stats::RawStat;
use crate::store::{Document, DocumentSession, RAWSTAT_COLLECTION};

/// What a bundle wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub resources: u64,
    pub collections: usize,
    pub stat_written: bool,
}

/// Groups resources into documents per collection
pub fn group_by_collection(
    resources: Vec<Resource>,
) -> Result<BTreeMap<String, Vec<Document>>, BundleError> {
    let mut grouped: BTreeMap<String, Vec<Document>> = BTreeMap::new();
    for resource in resources {
        let collection = resource.collection();
        let id = resource
            .id()
            .map(str::to_string)
            .unwrap_or_else(new_permanent_id);
        let body = resource
            .to_document()
            .map_err(|e| BundleError::Persist {
                collection: collection.clone(),
                source: StoreError::Serialization(e),
            })?;
        grouped
            .entry(collection)
            .or_default()
            .push(Document::new(id, body));
    }
    Ok(grouped)
}

/// Writes a bundle's resources and statistic through `session`
pub async fn persist_bundle<S>(
    session: &mut S,
    resources: Vec<Resource>,
    stat: Option<&RawStat>,
) -> Result<PersistSummary, BundleError>
where
    S: DocumentSession + ?Sized,
{
    let grouped = group_by_collection(resources)?;
    let mut summary = PersistSummary {
        collections: grouped.len(),
        ..Default::default()
    };

    for (collection, documents) in grouped {
        let written = session
            .insert_many(&collection, documents)
            .await
            .map_err(|source| BundleError::Persist {
                collection: collection.clone(),
                source,
            })?;
        summary.resources += written;
    }

    if let Some(stat) = stat {
        let body = serde_json::to_value(stat).map_err(|e| BundleError::Persist {
            collection: RAWSTAT_COLLECTION.to_string(),
            source: StoreError::Serialization(e),
        })?;
        session
            .insert_one(RAWSTAT_COLLECTION, Document::new(stat.id.clone(), body))
            .await
            .map_err(|source| BundleError::Persist {
                collection: RAWSTAT_COLLECTION.to_string(),
                source,
            })?;
        summary.stat_written = true;
    }

    debug!(
        resources = summary.resources,
        collections = summary.collections,
        stat = summary.stat_written,
        "Bundle persisted"
    );
    Ok(summary)
}
