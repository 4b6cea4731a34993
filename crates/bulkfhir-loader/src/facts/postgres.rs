//! Postgres fact sink
//!
//! Rows are streamed with `COPY ... FROM STDIN` in text format after a
//! `TRUNCATE` in the same transaction, so a failed pass leaves the
//! previous facts in place.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{FactKind, FactSink};
use crate::error::StoreError;
use crate::store::GroupRow;

/// COPY text-format NULL marker
const NULL: &str = "\\N";

pub struct PgFactSink {
    pool: PgPool,
}

impl PgFactSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn copy_statement(kind: FactKind) -> String {
    format!(
        "COPY {} ({}) FROM STDIN",
        kind.table(),
        kind.columns().join(", ")
    )
}

/// Escapes a value for COPY text format
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Encodes rows as tab-separated COPY text. An empty geo code is
/// written as NULL.
pub fn encode_rows(kind: FactKind, rows: &[GroupRow]) -> String {
    let mut data = String::new();
    for row in rows {
        let cs_fips = if row.cs_fips.is_empty() {
            NULL.to_string()
        } else {
            escape(&row.cs_fips)
        };
        data.push_str(&cs_fips);
        if kind.group_column().is_some() {
            match row.group_id {
                Some(id) => data.push_str(&format!("\t{id}")),
                None => {
                    data.push('\t');
                    data.push_str(NULL);
                }
            }
        }
        data.push_str(&format!(
            "\t{}\t{}\t{}\t{}\n",
            row.age_id, row.pop, row.pop_male, row.pop_female
        ));
    }
    data
}

#[async_trait]
impl FactSink for PgFactSink {
    async fn truncate(&self, kind: FactKind) -> Result<(), StoreError> {
        sqlx::query(&format!("TRUNCATE TABLE {}", kind.table()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace(&self, kind: FactKind, rows: &[GroupRow]) -> Result<u64, StoreError> {
        let data = encode_rows(kind, rows);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("TRUNCATE TABLE {}", kind.table()))
            .execute(&mut *tx)
            .await?;

        let mut copy = tx.copy_in_raw(&copy_statement(kind)).await?;
        copy.send(data.as_bytes()).await?;
        let copied = copy.finish().await?;

        tx.commit().await?;
        debug!(table = kind.table(), rows = copied, "Fact rows copied");
        Ok(copied)
    }
}
