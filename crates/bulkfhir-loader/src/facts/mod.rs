//! Fact table aggregation
//!
//! After ingestion drains, three passes roll the stored raw statistics
//! into relational fact tables: population, disease and condition. Each
//! pass replaces its table inside one transaction. A failed pass is
//! logged and reported; the remaining passes still run.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::StoreError;
use crate::store::{DocumentStore, GroupPipeline, GroupRow, IdList, RAWSTAT_COLLECTION};

pub use memory::MemoryFactSink;
pub use postgres::PgFactSink;

/// Columns shared by every fact table after the key columns
const COUNT_COLUMNS: [&str; 3] = ["pop", "pop_male", "pop_female"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FactKind {
    Population,
    Disease,
    Condition,
}

impl FactKind {
    /// Passes in the order they run
    pub const ALL: [FactKind; 3] = [FactKind::Population, FactKind::Disease, FactKind::Condition];

    pub fn table(self) -> &'static str {
        match self {
            FactKind::Population => "synth_ma.synth_pop_facts",
            FactKind::Disease => "synth_ma.synth_disease_facts",
            FactKind::Condition => "synth_ma.synth_condition_facts",
        }
    }

    /// Name of the group id column, if the table has one
    pub fn group_column(self) -> Option<&'static str> {
        match self {
            FactKind::Population => None,
            FactKind::Disease => Some("disease_id"),
            FactKind::Condition => Some("condition_id"),
        }
    }

    /// Column list in COPY order
    pub fn columns(self) -> Vec<&'static str> {
        let mut columns = vec!["cs_fips"];
        columns.extend(self.group_column());
        columns.push("age_id");
        columns.extend(COUNT_COLUMNS);
        columns
    }

    pub fn pipeline(self) -> GroupPipeline {
        match self {
            FactKind::Population => GroupPipeline::population(),
            FactKind::Disease => GroupPipeline::unwinding(IdList::Diseases),
            FactKind::Condition => GroupPipeline::unwinding(IdList::Conditions),
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FactKind::Population => "population",
            FactKind::Disease => "disease",
            FactKind::Condition => "condition",
        };
        f.write_str(name)
    }
}

/// Relational side of aggregation
#[async_trait]
pub trait FactSink: Send + Sync {
    async fn truncate(&self, kind: FactKind) -> Result<(), StoreError>;

    /// Replaces the table's rows with `rows`, all or nothing
    async fn replace(&self, kind: FactKind, rows: &[GroupRow]) -> Result<u64, StoreError>;
}

/// Outcome of one aggregation pass
#[derive(Debug)]
pub struct PassOutcome {
    pub kind: FactKind,
    pub result: Result<u64, StoreError>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct AggregationReport {
    pub passes: Vec<PassOutcome>,
}

impl AggregationReport {
    pub fn failed(&self) -> Vec<FactKind> {
        self.passes
            .iter()
            .filter(|p| p.result.is_err())
            .map(|p| p.kind)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.passes.iter().all(|p| p.result.is_ok())
    }

    pub fn rows(&self, kind: FactKind) -> Option<u64> {
        self.passes
            .iter()
            .find(|p| p.kind == kind)
            .and_then(|p| p.result.as_ref().ok().copied())
    }
}

pub struct AggregationEngine<'a, D, F> {
    documents: &'a D,
    sink: &'a F,
}

impl<'a, D, F> AggregationEngine<'a, D, F>
where
    D: DocumentStore,
    F: FactSink,
{
    pub fn new(documents: &'a D, sink: &'a F) -> Self {
        Self { documents, sink }
    }

    /// Runs one pass: aggregate statistics, then replace the fact table
    pub async fn run_pass(&self, kind: FactKind) -> Result<u64, StoreError> {
        let rows = self
            .documents
            .aggregate(RAWSTAT_COLLECTION, &kind.pipeline())
            .await?;
        self.sink.replace(kind, &rows).await
    }

    /// Runs every pass in order, continuing past failures
    pub async fn run_all(&self) -> AggregationReport {
        let mut report = AggregationReport::default();

        for kind in FactKind::ALL {
            let start = Instant::now();
            let result = self.run_pass(kind).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(rows) => info!(
                    pass = %kind,
                    table = kind.table(),
                    rows,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Aggregation pass complete"
                ),
                Err(e) => error!(
                    pass = %kind,
                    table = kind.table(),
                    error = %e,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Aggregation pass failed, table left unchanged"
                ),
            }
            report.passes.push(PassOutcome {
                kind,
                result,
                elapsed,
            });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_columns() {
        assert_eq!(
            FactKind::Population.columns(),
            vec!["cs_fips", "age_id", "pop", "pop_male", "pop_female"]
        );
        assert_eq!(
            FactKind::Disease.columns(),
            vec!["cs_fips", "disease_id", "age_id", "pop", "pop_male", "pop_female"]
        );
        assert_eq!(
            FactKind::Condition.columns(),
            vec!["cs_fips", "condition_id", "age_id", "pop", "pop_male", "pop_female"]
        );
    }

    #[test]
    fn test_fact_pipelines() {
        assert_eq!(FactKind::Population.pipeline().unwind, None);
        assert_eq!(FactKind::Disease.pipeline().unwind, Some(IdList::Diseases));
        assert_eq!(FactKind::Condition.pipeline().unwind, Some(IdList::Conditions));
        assert_eq!(FactKind::Disease.to_string(), "disease");
    }
}
