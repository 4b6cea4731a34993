//! Document store boundary
//!
//! Resources and raw statistics are stored as JSON documents grouped into
//! named collections. Each ingestion worker opens its own
//! [`DocumentSession`]; sessions are never shared between workers.

pub mod memory;
pub mod pipeline;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use memory::MemoryDocumentStore;
pub use pipeline::{GroupPipeline, GroupRow, IdList};
pub use postgres::PgDocumentStore;

/// Collection holding one raw statistic per ingested patient
pub const RAWSTAT_COLLECTION: &str = "rawstat";

/// Collections owned by the loader, dropped on reset
pub const LOADER_COLLECTIONS: &[&str] = &[
    "allergyintolerances",
    "careplans",
    "conditions",
    "diagnosticreports",
    "encounters",
    "immunizations",
    "medicationorders",
    "medicationrequests",
    "observations",
    "patients",
    "procedures",
    RAWSTAT_COLLECTION,
];

/// A stored document and its key within a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// Per-worker write session
#[async_trait]
pub trait DocumentSession: Send {
    /// Unordered bulk insert into one collection
    async fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64, StoreError>;

    async fn insert_one(&mut self, collection: &str, document: Document)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    type Session: DocumentSession + 'static;

    async fn open_session(&self) -> Result<Self::Session, StoreError>;

    async fn drop_collections(&self, collections: &[&str]) -> Result<(), StoreError>;

    /// Runs a group pipeline over every document of `collection`
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &GroupPipeline,
    ) -> Result<Vec<GroupRow>, StoreError>;
}
