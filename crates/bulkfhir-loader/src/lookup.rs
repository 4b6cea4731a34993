//! Reference lookup tables
//!
//! Loaded once from the relational database before ingestion starts and
//! shared read-only by every worker. Any table failing to load is fatal.

use std::collections::HashMap;

use bulkfhir_common::{BulkError, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::ingest::stats::UNMAPPED_ID;

pub const COUSUB_TABLE: &str = "synth_ma.synth_cousub_dim";
pub const CONDITION_TABLE: &str = "synth_ma.synth_condition_dim";
pub const AGE_TABLE: &str = "synth_ma.synth_age_dim";

/// Bracket used when no configured bracket covers an age
pub const DEFAULT_AGE_BRACKET: i32 = 0;

/// County and county-subdivision FIPS codes for a city
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdivision {
    pub county_fips: String,
    pub subcounty_fips: String,
}

/// Subdivision name without a trailing " Town" suffix
pub fn normalize_subdivision_name(name: &str) -> &str {
    name.strip_suffix(" Town").unwrap_or(name)
}

#[derive(Debug, Default, Clone)]
pub struct CousubTable {
    by_city: HashMap<String, Subdivision>,
}

impl CousubTable {
    /// Builds the table from `(name, county_fips, subcounty_fips)` rows.
    /// Names are normalised; the first row for a name wins.
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        let mut by_city = HashMap::new();
        for (name, county_fips, subcounty_fips) in rows {
            let name: String = name.into();
            by_city
                .entry(normalize_subdivision_name(&name).to_string())
                .or_insert(Subdivision {
                    county_fips: county_fips.into(),
                    subcounty_fips: subcounty_fips.into(),
                });
        }
        Self { by_city }
    }

    pub fn get(&self, city: &str) -> Option<&Subdivision> {
        self.by_city.get(city)
    }

    pub fn len(&self) -> usize {
        self.by_city.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_city.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiseaseKey {
    pub system: String,
    pub code: String,
}

impl DiseaseKey {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
        }
    }
}

/// Condition and disease group ids for a coded condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseaseGroup {
    pub condition_id: i32,
    pub disease_id: i32,
}

impl DiseaseGroup {
    pub const UNMAPPED: DiseaseGroup = DiseaseGroup {
        condition_id: UNMAPPED_ID,
        disease_id: UNMAPPED_ID,
    };
}

#[derive(Debug, Default, Clone)]
pub struct DiseaseTable {
    by_code: HashMap<DiseaseKey, DiseaseGroup>,
}

impl DiseaseTable {
    /// Builds the table from `(condition_id, disease_id, system, code)` rows.
    /// A missing disease id is stored as the unmapped sentinel.
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (i32, Option<i32>, S, S)>,
        S: Into<String>,
    {
        let by_code = rows
            .into_iter()
            .map(|(condition_id, disease_id, system, code)| {
                (
                    DiseaseKey::new(system, code),
                    DiseaseGroup {
                        condition_id,
                        disease_id: disease_id.unwrap_or(UNMAPPED_ID),
                    },
                )
            })
            .collect();
        Self { by_code }
    }

    /// Group for `(system, code)`, or the unmapped sentinel pair
    pub fn lookup(&self, system: &str, code: &str) -> DiseaseGroup {
        self.by_code
            .get(&DiseaseKey::new(system, code))
            .copied()
            .unwrap_or(DiseaseGroup::UNMAPPED)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Inclusive age range mapped to a bracket id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBracket {
    pub id: i32,
    pub min_age: u32,
    pub max_age: u32,
}

impl AgeBracket {
    fn contains(&self, age: u32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }
}

#[derive(Debug, Default, Clone)]
pub struct AgeBrackets {
    brackets: Vec<AgeBracket>,
}

impl AgeBrackets {
    /// Brackets are kept sorted by lower bound; overlaps resolve to the
    /// bracket with the lowest `min_age`.
    pub fn new(mut brackets: Vec<AgeBracket>) -> Self {
        brackets.sort_by_key(|b| (b.min_age, b.id));
        Self { brackets }
    }

    /// Bracket id for an age, or [`DEFAULT_AGE_BRACKET`] when none covers it
    pub fn bracket_for(&self, age: Option<u32>) -> i32 {
        age.and_then(|age| self.brackets.iter().find(|b| b.contains(age)))
            .map(|b| b.id)
            .unwrap_or(DEFAULT_AGE_BRACKET)
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }
}

/// Immutable lookup state shared by all workers
#[derive(Debug, Default, Clone)]
pub struct LookupTables {
    pub cousubs: CousubTable,
    pub diseases: DiseaseTable,
    pub ages: AgeBrackets,
}

impl LookupTables {
    /// Loads every table from the relational database
    pub async fn load(pool: &PgPool) -> Result<Self> {
        let cousub_rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT cd.cs_name::text, cd.ct_fips::text, cd.cs_fips::text \
             FROM synth_ma.synth_cousub_dim cd",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| BulkError::lookup(COUSUB_TABLE, e))?;
        let cousubs = CousubTable::from_rows(cousub_rows);
        info!(table = COUSUB_TABLE, rows = cousubs.len(), "Loaded lookup table");

        let disease_rows: Vec<(i32, Option<i32>, String, String)> = sqlx::query_as(
            "SELECT cd.condition_id::int4, cd.disease_id::int4, cd.code_system::text, cd.code::text \
             FROM synth_ma.synth_condition_dim cd",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| BulkError::lookup(CONDITION_TABLE, e))?;
        let diseases = DiseaseTable::from_rows(disease_rows);
        info!(table = CONDITION_TABLE, rows = diseases.len(), "Loaded lookup table");

        let age_rows: Vec<(i32, i32, i32)> = sqlx::query_as(
            "SELECT ad.age_id::int4, ad.min_age::int4, ad.max_age::int4 \
             FROM synth_ma.synth_age_dim ad",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| BulkError::lookup(AGE_TABLE, e))?;
        let ages = age_rows
            .into_iter()
            .map(|(id, min_age, max_age)| {
                Ok(AgeBracket {
                    id,
                    min_age: u32::try_from(min_age)
                        .map_err(|_| BulkError::lookup(AGE_TABLE, "negative min_age"))?,
                    max_age: u32::try_from(max_age)
                        .map_err(|_| BulkError::lookup(AGE_TABLE, "negative max_age"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let ages = AgeBrackets::new(ages);
        info!(table = AGE_TABLE, rows = ages.len(), "Loaded lookup table");

        Ok(Self {
            cousubs,
            diseases,
            ages,
        })
    }
}
