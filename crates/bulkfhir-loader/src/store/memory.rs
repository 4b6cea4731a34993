//! In-process document store
//!
//! Backs integration tests and dry runs. Collections live behind one
//! mutex; sessions are cheap handles onto the same state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use super::{Document, DocumentSession, DocumentStore, GroupPipeline, GroupRow};
use crate::error::StoreError;
use crate::ingest::stats::RawStat;

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Document>>,
    failing: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<State>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later write to `collection` fail
    pub fn fail_writes_to(&self, collection: &str) {
        self.state().failing.insert(collection.to_string());
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.state().collections.get(collection).map_or(0, Vec::len)
    }

    /// Names of the non-empty collections, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .collections
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn write(&self, collection: &str, documents: Vec<Document>) -> Result<u64, StoreError> {
        let mut state = self.state();
        if state.failing.contains(collection) {
            return Err(StoreError::Rejected {
                collection: collection.to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        let written = documents.len() as u64;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        Ok(written)
    }
}

pub struct MemorySession {
    store: MemoryDocumentStore,
}

#[async_trait]
impl DocumentSession for MemorySession {
    async fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64, StoreError> {
        self.store.write(collection, documents)
    }

    async fn insert_one(
        &mut self,
        collection: &str,
        document: Document,
    ) -> Result<(), StoreError> {
        self.store.write(collection, vec![document]).map(|_| ())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<MemorySession, StoreError> {
        Ok(MemorySession {
            store: self.clone(),
        })
    }

    async fn drop_collections(&self, collections: &[&str]) -> Result<(), StoreError> {
        let mut state = self.state();
        for name in collections {
            state.collections.remove(*name);
        }
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &GroupPipeline,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let stats: Vec<RawStat> = self
            .documents(collection)
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc.body) {
                Ok(stat) => Some(stat),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping undecodable statistic");
                    None
                }
            })
            .collect();
        Ok(pipeline.run(&stats))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sessions_share_state() {
        let store = MemoryDocumentStore::new();
        let mut a = store.open_session().await.unwrap();
        let mut b = store.open_session().await.unwrap();

        a.insert_many(
            "patients",
            vec![Document::new("1", json!({})), Document::new("2", json!({}))],
        )
        .await
        .unwrap();
        b.insert_one("patients", Document::new("3", json!({})))
            .await
            .unwrap();

        assert_eq!(store.count("patients"), 3);
        assert_eq!(store.collection_names(), vec!["patients"]);
    }

    #[tokio::test]
    async fn test_failing_collection_and_drop() {
        let store = MemoryDocumentStore::new();
        store.fail_writes_to("rawstat");
        let mut session = store.open_session().await.unwrap();

        session
            .insert_one("conditions", Document::new("c", json!({})))
            .await
            .unwrap();
        let err = session
            .insert_one("rawstat", Document::new("r", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));

        store.drop_collections(&["conditions"]).await.unwrap();
        assert_eq!(store.count("conditions"), 0);
    }
}
