//! In-process fact sink for tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{FactKind, FactSink};
use crate::error::StoreError;
use crate::store::GroupRow;

#[derive(Default)]
struct Tables {
    rows: HashMap<FactKind, Vec<GroupRow>>,
    failing: HashSet<FactKind>,
}

#[derive(Clone, Default)]
pub struct MemoryFactSink {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryFactSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later `replace` of `kind` fail
    pub fn fail_pass(&self, kind: FactKind) {
        self.tables().failing.insert(kind);
    }

    pub fn rows(&self, kind: FactKind) -> Vec<GroupRow> {
        self.tables().rows.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FactSink for MemoryFactSink {
    async fn truncate(&self, kind: FactKind) -> Result<(), StoreError> {
        self.tables().rows.remove(&kind);
        Ok(())
    }

    async fn replace(&self, kind: FactKind, rows: &[GroupRow]) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        if tables.failing.contains(&kind) {
            return Err(StoreError::Rejected {
                collection: kind.table().to_string(),
                reason: "copy failed".to_string(),
            });
        }
        tables.rows.insert(kind, rows.to_vec());
        Ok(rows.len() as u64)
    }
}
