//! Per-patient raw statistics
//!
//! One [`RawStat`] is derived from each bundle that contains a Patient.
//! It is the only input the aggregation passes read.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fhir::resource::{Condition, Patient};
use crate::fhir::Resource;
use crate::lookup::LookupTables;

/// Group id for codes absent from the disease table
pub const UNMAPPED_ID: i32 = -999;

/// Tracked condition and disease ids are strictly positive
pub fn is_tracked(id: i32) -> bool {
    id > 0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "countyid_fips", default, skip_serializing_if = "String::is_empty")]
    pub county_fips: String,
    #[serde(rename = "subcountyid_fips", default, skip_serializing_if = "String::is_empty")]
    pub subcounty_fips: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(rename = "zipcode", default, skip_serializing_if = "String::is_empty")]
    pub zip_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(rename = "conditionid")]
    pub condition_id: i32,
    #[serde(rename = "diseaseid")]
    pub disease_id: i32,
}

/// Compact per-patient summary stored in the `rawstat` collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStat {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub location: Location,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(rename = "agerange", default)]
    pub age_range: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    /// Only written when true; an absent flag means living
    #[serde(rename = "deceasedboolean", default, skip_serializing_if = "is_false")]
    pub deceased: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionCode>,

    #[serde(rename = "uniqueconditions", default, skip_serializing_if = "Vec::is_empty")]
    pub unique_conditions: Vec<i32>,

    #[serde(rename = "uniquediseases", default, skip_serializing_if = "Vec::is_empty")]
    pub unique_diseases: Vec<i32>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Distinct tracked ids, ascending
pub fn unique_tracked<I: IntoIterator<Item = i32>>(ids: I) -> Vec<i32> {
    ids.into_iter()
        .filter(|id| is_tracked(*id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Parses a FHIR date or dateTime, accepting partial `YYYY` and `YYYY-MM`
/// forms by pinning the missing parts to the first day.
pub fn parse_fhir_date(value: &str) -> Option<NaiveDate> {
    let date = value.get(..10).unwrap_or(value);
    let mut parts = date.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next().map(str::parse::<u32>).transpose().ok()?.unwrap_or(1);
    let day = parts.next().map(str::parse::<u32>).transpose().ok()?.unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whole elapsed years between `birth` and `today`.
///
/// A birthday not yet reached in the current year does not count. Birth
/// dates after `today` yield 0.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    if birth > today {
        return 0;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Derives [`RawStat`] records from rewritten bundles
#[derive(Debug, Clone, Copy)]
pub struct StatExtractor<'a> {
    tables: &'a LookupTables,
    as_of: NaiveDate,
}

impl<'a> StatExtractor<'a> {
    pub fn new(tables: &'a LookupTables, as_of: NaiveDate) -> Self {
        Self { tables, as_of }
    }

    /// Statistic for the bundle's patient, or `None` if there is no patient
    pub fn extract<'r, I>(&self, resources: I) -> Option<RawStat>
    where
        I: IntoIterator<Item = &'r Resource>,
    {
        let mut patient: Option<&Patient> = None;
        let mut conditions = Vec::new();

        for resource in resources {
            match resource {
                Resource::Patient(p) if patient.is_none() => patient = Some(p),
                Resource::Patient(p) => {
                    warn!(
                        patient_id = p.id.as_deref().unwrap_or(""),
                        "Bundle has more than one Patient, ignoring extra"
                    );
                }
                Resource::Condition(c) => conditions.push(self.condition_code(c)),
                _ => {}
            }
        }

        let patient = patient?;
        let mut stat = self.patient_stat(patient);
        stat.unique_conditions = unique_tracked(conditions.iter().map(|c| c.condition_id));
        stat.unique_diseases = unique_tracked(conditions.iter().map(|c| c.disease_id));
        stat.conditions = conditions;
        Some(stat)
    }

    fn patient_stat(&self, patient: &Patient) -> RawStat {
        let age = patient.birth_date.as_deref().and_then(|raw| {
            let parsed = parse_fhir_date(raw);
            if parsed.is_none() {
                warn!(birth_date = raw, "Unparseable birth date");
            }
            parsed.map(|birth| age_on(birth, self.as_of))
        });

        let mut location = Location::default();
        if let Some(address) = patient.address.first() {
            location.city = address.city.clone().unwrap_or_default();
            location.zip_code = address.postal_code.clone().unwrap_or_default();
            match self.tables.cousubs.get(&location.city) {
                Some(subdivision) => {
                    location.county_fips = subdivision.county_fips.clone();
                    location.subcounty_fips = subdivision.subcounty_fips.clone();
                }
                None => debug!(city = %location.city, "City not found in subdivision table"),
            }
        }

        RawStat {
            id: patient.id.clone().unwrap_or_default(),
            location,
            gender: patient.gender.clone(),
            age_range: self.tables.ages.bracket_for(age),
            age,
            deceased: patient.is_deceased(),
            ..Default::default()
        }
    }

    fn condition_code(&self, condition: &Condition) -> ConditionCode {
        let (system, code) = condition
            .primary_coding()
            .map(|coding| {
                (
                    coding.system.clone().unwrap_or_default(),
                    coding.code.clone().unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        let group = self.tables.diseases.lookup(&system, &code);
        ConditionCode {
            system,
            code,
            condition_id: group.condition_id,
            disease_id: group.disease_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fhir::Bundle;
    use crate::lookup::{AgeBracket, AgeBrackets, CousubTable, DiseaseTable};
    use proptest::prelude::*;
    use serde_json::json;

    const SNOMED: &str = "http://snomed.info/sct";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tables() -> LookupTables {
        LookupTables {
            cousubs: CousubTable::from_rows([("Barnstable Town", "25001", "03690")]),
            diseases: DiseaseTable::from_rows([
                (1, Some(7), SNOMED, "44054006"),
                (2, Some(7), SNOMED, "15777000"),
                (3, None, SNOMED, "38341003"),
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
            ]),
        }
    }

    fn resources(value: serde_json::Value) -> Vec<Resource> {
        Bundle::from_slice(value.to_string().as_bytes())
            .unwrap()
            .into_resources()
    }

    fn condition(code: &str) -> serde_json::Value {
        json!({"resource": {
            "resourceType": "Condition",
            "code": {"coding": [{"system": SNOMED, "code": code}]}
        }})
    }

    #[test]
    fn test_age_on_is_anniversary_aware() {
        let birth = date(1980, 5, 1);
        assert_eq!(age_on(birth, date(2020, 4, 30)), 39);
        assert_eq!(age_on(birth, date(2020, 5, 1)), 40);
        assert_eq!(age_on(birth, date(1980, 5, 1)), 0);
        assert_eq!(age_on(birth, date(1970, 1, 1)), 0);
    }

    #[test]
    fn test_parse_fhir_date_forms() {
        assert_eq!(parse_fhir_date("1980-05-17"), Some(date(1980, 5, 17)));
        assert_eq!(
            parse_fhir_date("1980-05-17T10:00:00-05:00"),
            Some(date(1980, 5, 17))
        );
        assert_eq!(parse_fhir_date("1980-05"), Some(date(1980, 5, 1)));
        assert_eq!(parse_fhir_date("1980"), Some(date(1980, 1, 1)));
        assert_eq!(parse_fhir_date("not-a-date"), None);
        assert_eq!(parse_fhir_date("1980-13-01"), None);
    }

    #[test]
    fn test_extract_patient_with_conditions() {
        let tables = tables();
        let extractor = StatExtractor::new(&tables, date(2020, 6, 1));
        let resources = resources(json!({"entry": [
            {"resource": {
                "resourceType": "Patient",
                "id": "p1",
                "gender": "female",
                "birthDate": "1990-07-01",
                "address": [{"city": "Barnstable", "postalCode": "02630"}]
            }},
            condition("44054006"),
            condition("15777000"),
            condition("38341003"),
            condition("999999")
        ]}));

        let stat = extractor.extract(&resources).unwrap();

        assert_eq!(stat.id, "p1");
        assert_eq!(stat.gender.as_deref(), Some("female"));
        assert_eq!(stat.age, Some(29));
        assert_eq!(stat.age_range, 2);
        assert!(!stat.deceased);
        assert_eq!(stat.location.county_fips, "25001");
        assert_eq!(stat.location.subcounty_fips, "03690");
        assert_eq!(stat.location.zip_code, "02630");
        assert_eq!(stat.conditions.len(), 4);
        assert_eq!(stat.conditions[3].condition_id, UNMAPPED_ID);
        assert_eq!(stat.unique_conditions, vec![1, 2, 3]);
        assert_eq!(stat.unique_diseases, vec![7]);
    }

    #[test]
    fn test_unknown_city_and_missing_birth_date() {
        let tables = tables();
        let extractor = StatExtractor::new(&tables, date(2020, 6, 1));
        let resources = resources(json!({"entry": [
            {"resource": {
                "resourceType": "Patient",
                "id": "p2",
                "address": [{"city": "Atlantis"}],
                "deceasedDateTime": "2019-01-01"
            }}
        ]}));

        let stat = extractor.extract(&resources).unwrap();

        assert_eq!(stat.location.city, "Atlantis");
        assert!(stat.location.subcounty_fips.is_empty());
        assert_eq!(stat.age, None);
        assert_eq!(stat.age_range, crate::lookup::DEFAULT_AGE_BRACKET);
        assert!(stat.deceased);
    }

    #[test]
    fn test_bundle_without_patient_yields_nothing() {
        let tables = tables();
        let extractor = StatExtractor::new(&tables, date(2020, 6, 1));
        let resources = resources(json!({"entry": [condition("44054006")]}));
        assert!(extractor.extract(&resources).is_none());
    }

    #[test]
    fn test_raw_stat_document_shape() {
        let stat = RawStat {
            id: "p1".to_string(),
            location: Location {
                county_fips: "25001".to_string(),
                subcounty_fips: "03690".to_string(),
                city: "Barnstable".to_string(),
                zip_code: String::new(),
            },
            gender: Some("male".to_string()),
            age_range: 2,
            age: Some(40),
            deceased: false,
            conditions: vec![],
            unique_conditions: vec![1],
            unique_diseases: vec![7],
        };

        let value = serde_json::to_value(&stat).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "p1",
                "location": {
                    "countyid_fips": "25001",
                    "subcountyid_fips": "03690",
                    "city": "Barnstable"
                },
                "gender": "male",
                "agerange": 2,
                "age": 40,
                "uniqueconditions": [1],
                "uniquediseases": [7]
            })
        );
        let back: RawStat = serde_json::from_value(value).unwrap();
        assert_eq!(back, stat);
    }

    proptest! {
        #[test]
        fn prop_unique_tracked_has_no_duplicates_or_sentinels(
            ids in proptest::collection::vec(prop_oneof![Just(UNMAPPED_ID), -5i32..50], 0..40)
        ) {
            let unique = unique_tracked(ids.iter().copied());

            let mut seen = std::collections::HashSet::new();
            for id in &unique {
                prop_assert!(is_tracked(*id));
                prop_assert!(seen.insert(*id));
                prop_assert!(ids.contains(id));
            }
            for id in ids.iter().filter(|id| is_tracked(**id)) {
                prop_assert!(unique.contains(id));
            }
        }
    }
}
