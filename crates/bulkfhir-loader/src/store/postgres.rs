//! Postgres JSONB document store
//!
//! All collections share the `fhir_documents` table, keyed by
//! `(collection, id)`. Group pipelines are compiled to a single
//! `GROUP BY` query.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{Document, DocumentSession, DocumentStore, GroupPipeline, GroupRow};
use crate::error::StoreError;

/// Postgres bind parameter limit
const MAX_BIND_PARAMS: usize = 65_535;

/// Bound parameters per inserted document
const PARAMS_PER_DOCUMENT: usize = 3;

/// Largest insert batch that fits in one statement
pub const MAX_BATCH_SIZE: usize = MAX_BIND_PARAMS / PARAMS_PER_DOCUMENT;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Creates the document table if needed
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A worker's dedicated connection
pub struct PgDocumentSession {
    conn: PoolConnection<Postgres>,
    batch_size: usize,
}

#[async_trait]
impl DocumentSession for PgDocumentSession {
    async fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<u64, StoreError> {
        let mut written = 0;
        for chunk in documents.chunks(self.batch_size) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO fhir_documents (collection, id, body) ");
            query_builder.push_values(chunk.iter(), |mut b, doc| {
                b.push_bind(collection)
                    .push_bind(&doc.id)
                    .push_bind(Json(&doc.body));
            });

            let result = query_builder.build().execute(&mut *self.conn).await?;
            written += result.rows_affected();
        }
        debug!(collection, written, "Inserted documents");
        Ok(written)
    }

    async fn insert_one(
        &mut self,
        collection: &str,
        document: Document,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO fhir_documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&document.id)
            .bind(Json(&document.body))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

/// SQL for a group pipeline. `$1` is the collection name.
pub fn group_query(pipeline: &GroupPipeline) -> String {
    let (group_expr, unwind) = match pipeline.unwind {
        None => ("NULL::int4", String::new()),
        Some(list) => (
            "unwound.id::int4",
            format!(
                " CROSS JOIN LATERAL jsonb_array_elements_text(\
                 COALESCE(d.body -> '{}', '[]'::jsonb)) AS unwound(id)",
                list.field()
            ),
        ),
    };
    let tracked = if pipeline.unwind.is_some() {
        " AND unwound.id::int4 > 0"
    } else {
        ""
    };

    format!(
        "SELECT COALESCE(d.body #>> '{{location,subcountyid_fips}}', '') AS cs_fips, \
         COALESCE((d.body ->> 'agerange')::int4, 0) AS age_id, \
         {group_expr} AS group_id, \
         COUNT(*) AS pop, \
         COUNT(*) FILTER (WHERE d.body ->> 'gender' = 'male') AS pop_male, \
         COUNT(*) FILTER (WHERE d.body ->> 'gender' = 'female') AS pop_female \
         FROM fhir_documents d{unwind} \
         WHERE d.collection = $1 \
         AND COALESCE((d.body ->> 'deceasedboolean')::boolean, false) = false{tracked} \
         GROUP BY 1, 2, 3 \
         ORDER BY 1, 2, 3"
    )
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    type Session = PgDocumentSession;

    async fn open_session(&self) -> Result<PgDocumentSession, StoreError> {
        Ok(PgDocumentSession {
            conn: self.pool.acquire().await?,
            batch_size: self.batch_size,
        })
    }

    async fn drop_collections(&self, collections: &[&str]) -> Result<(), StoreError> {
        let names: Vec<String> = collections.iter().map(|c| c.to_string()).collect();
        let result = sqlx::query("DELETE FROM fhir_documents WHERE collection = ANY($1)")
            .bind(&names)
            .execute(&self.pool)
            .await?;
        debug!(
            collections = names.len(),
            removed = result.rows_affected(),
            "Dropped collections"
        );
        Ok(())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &GroupPipeline,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let rows: Vec<(String, i32, Option<i32>, i64, i64, i64)> =
            sqlx::query_as(&group_query(pipeline))
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(
                |(cs_fips, age_id, group_id, pop, pop_male, pop_female)| GroupRow {
                    cs_fips,
                    age_id,
                    group_id,
                    pop,
                    pop_male,
                    pop_female,
                },
            )
            .collect())
    }
}
