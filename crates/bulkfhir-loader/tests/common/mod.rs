//! Shared fixtures for loader integration tests
//!
//! Bundle files are written into a temp directory; lookup tables are built
//! in memory. [`TestPostgres`] starts a throwaway Postgres container for
//! the tests that need a real database.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bulkfhir_loader::ingest::IngestContext;
use bulkfhir_loader::lookup::{AgeBracket, AgeBrackets, CousubTable, DiseaseTable, LookupTables};
use chrono::NaiveDate;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

pub const SNOMED: &str = "http://snomed.info/sct";

/// Diabetes (condition 1) and prediabetes (condition 2) both roll up to disease 7.
pub const DIABETES: &str = "44054006";
pub const PREDIABETES: &str = "15777000";
/// Hypertension: condition 3, no disease group
pub const HYPERTENSION: &str = "38341003";

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,bulkfhir_loader=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

pub fn lookup_tables() -> LookupTables {
    LookupTables {
        cousubs: CousubTable::from_rows([
            ("Barnstable Town", "25001", "03690"),
            ("Boston", "25025", "07000"),
        ]),
        diseases: DiseaseTable::from_rows([
            (1, Some(7), SNOMED, DIABETES),
            (2, Some(7), SNOMED, PREDIABETES),
            (3, None, SNOMED, HYPERTENSION),
        ]),
        ages: AgeBrackets::new(vec![
            AgeBracket {
                id: 1,
                min_age: 0,
                max_age: 17,
            },
            AgeBracket {
                id: 2,
                min_age: 18,
                max_age: 64,
            },
            AgeBracket {
                id: 3,
                min_age: 65,
                max_age: 150,
            },
        ]),
    }
}

/// Context with ages computed as of 2020-06-01
pub fn ingest_context() -> Arc<IngestContext> {
    Arc::new(IngestContext::new(
        lookup_tables(),
        NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
    ))
}

/// Minimal patient description for bundle fixtures
pub struct PatientFixture<'a> {
    pub gender: &'a str,
    pub birth_date: &'a str,
    pub city: &'a str,
    pub deceased: bool,
    pub conditions: &'a [&'a str],
}

/// A transaction bundle: one patient, one encounter and the given
/// conditions, all cross-referenced through `urn:uuid:` fullUrls.
pub fn patient_bundle(tag: &str, fixture: &PatientFixture<'_>) -> Value {
    let patient_url = format!("urn:uuid:patient-{tag}");
    let encounter_url = format!("urn:uuid:encounter-{tag}");

    let mut patient = json!({
        "resourceType": "Patient",
        "gender": fixture.gender,
        "birthDate": fixture.birth_date,
        "address": [{"city": fixture.city, "postalCode": "02101", "state": "MA"}]
    });
    if fixture.deceased {
        patient["deceasedDateTime"] = json!("2019-01-01T00:00:00Z");
    }

    let mut entries = vec![
        json!({"fullUrl": patient_url, "resource": patient}),
        json!({"fullUrl": encounter_url, "resource": {
            "resourceType": "Encounter",
            "patient": {"reference": patient_url},
            "class": "ambulatory"
        }}),
    ];
    for (i, code) in fixture.conditions.iter().enumerate() {
        entries.push(json!({
            "fullUrl": format!("urn:uuid:condition-{tag}-{i}"),
            "resource": {
                "resourceType": "Condition",
                "patient": {"reference": patient_url},
                "encounter": {"reference": encounter_url},
                "code": {"coding": [{"system": SNOMED, "code": code}]}
            }
        }));
    }

    json!({"resourceType": "Bundle", "type": "transaction", "entry": entries})
}

pub fn write_bundle(dir: &Path, name: &str, bundle: &Value) {
    fs::write(dir.join(name), serde_json::to_vec_pretty(bundle).unwrap()).unwrap();
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Creates the `synth_ma` lookup and fact tables and seeds the lookups
    /// with the same rows as [`lookup_tables`].
    pub async fn seed_synth_schema(&self) -> Result<()> {
        let statements = [
            "CREATE SCHEMA IF NOT EXISTS synth_ma",
            "CREATE TABLE synth_ma.synth_cousub_dim (cs_name TEXT, ct_fips TEXT, cs_fips TEXT)",
            "CREATE TABLE synth_ma.synth_condition_dim \
             (condition_id INTEGER, disease_id INTEGER, code_system TEXT, code TEXT)",
            "CREATE TABLE synth_ma.synth_age_dim (age_id INTEGER, min_age INTEGER, max_age INTEGER)",
            "CREATE TABLE synth_ma.synth_pop_facts \
             (cs_fips TEXT, age_id INTEGER, pop BIGINT, pop_male BIGINT, pop_female BIGINT)",
            "CREATE TABLE synth_ma.synth_disease_facts \
             (cs_fips TEXT, disease_id INTEGER, age_id INTEGER, pop BIGINT, pop_male BIGINT, pop_female BIGINT)",
            "CREATE TABLE synth_ma.synth_condition_facts \
             (cs_fips TEXT, condition_id INTEGER, age_id INTEGER, pop BIGINT, pop_male BIGINT, pop_female BIGINT)",
            "INSERT INTO synth_ma.synth_cousub_dim VALUES \
             ('Barnstable Town', '25001', '03690'), ('Boston', '25025', '07000')",
            "INSERT INTO synth_ma.synth_condition_dim VALUES \
             (1, 7, 'http://snomed.info/sct', '44054006'), \
             (2, 7, 'http://snomed.info/sct', '15777000'), \
             (3, NULL, 'http://snomed.info/sct', '38341003')",
            "INSERT INTO synth_ma.synth_age_dim VALUES (1, 0, 17), (2, 18, 64), (3, 65, 150)",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run: {statement}"))?;
        }
        Ok(())
    }
}
