//! Group-and-count pipeline over raw statistics
//!
//! The document store boundary exposes one aggregation shape: keep living
//! patients, optionally unwind one id list (dropping untracked ids), group
//! by `(subdivision, age bracket[, id])` and count. [`GroupPipeline::run`]
//! is the reference executor; store backends either call it or compile the
//! same shape to their own query language.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ingest::stats::{is_tracked, RawStat};

/// Id list of a [`RawStat`] that a pipeline can unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdList {
    Diseases,
    Conditions,
}

impl IdList {
    /// Field holding the list in the stored document
    pub fn field(self) -> &'static str {
        match self {
            IdList::Diseases => "uniquediseases",
            IdList::Conditions => "uniqueconditions",
        }
    }

    fn ids(self, stat: &RawStat) -> &[i32] {
        match self {
            IdList::Diseases => &stat.unique_diseases,
            IdList::Conditions => &stat.unique_conditions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPipeline {
    pub unwind: Option<IdList>,
}

/// One output group of a [`GroupPipeline`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRow {
    pub cs_fips: String,
    pub age_id: i32,
    pub group_id: Option<i32>,
    pub pop: i64,
    pub pop_male: i64,
    pub pop_female: i64,
}

#[derive(Default)]
struct Counts {
    pop: i64,
    male: i64,
    female: i64,
}

impl GroupPipeline {
    pub const fn population() -> Self {
        Self { unwind: None }
    }

    pub const fn unwinding(list: IdList) -> Self {
        Self { unwind: Some(list) }
    }

    /// Runs the pipeline over in-memory statistics.
    ///
    /// Rows come back ordered by `(cs_fips, age_id, group_id)`.
    pub fn run<'a, I>(&self, stats: I) -> Vec<GroupRow>
    where
        I: IntoIterator<Item = &'a RawStat>,
    {
        let mut groups: BTreeMap<(String, i32, Option<i32>), Counts> = BTreeMap::new();

        for stat in stats.into_iter().filter(|s| !s.deceased) {
            let keys: Vec<Option<i32>> = match self.unwind {
                None => vec![None],
                Some(list) => list
                    .ids(stat)
                    .iter()
                    .copied()
                    .filter(|id| is_tracked(*id))
                    .map(Some)
                    .collect(),
            };

            for group_id in keys {
                let counts = groups
                    .entry((
                        stat.location.subcounty_fips.clone(),
                        stat.age_range,
                        group_id,
                    ))
                    .or_default();
                counts.pop += 1;
                match stat.gender.as_deref() {
                    Some("male") => counts.male += 1,
                    Some("female") => counts.female += 1,
                    _ => {}
                }
            }
        }

        groups
            .into_iter()
            .map(|((cs_fips, age_id, group_id), c)| GroupRow {
                cs_fips,
                age_id,
                group_id,
                pop: c.pop,
                pop_male: c.male,
                pop_female: c.female,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::stats::{Location, UNMAPPED_ID};

    fn stat(fips: &str, bracket: i32, gender: &str, diseases: &[i32]) -> RawStat {
        RawStat {
            id: format!("{fips}-{bracket}-{gender}-{diseases:?}"),
            location: Location {
                subcounty_fips: fips.to_string(),
                ..Default::default()
            },
            gender: Some(gender.to_string()),
            age_range: bracket,
            unique_diseases: diseases.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_population_and_disease_rollups() {
        let stats = vec![
            stat("A", 2, "male", &[7]),
            stat("A", 2, "female", &[7]),
            stat("A", 2, "male", &[]),
        ];

        let population = GroupPipeline::population().run(&stats);
        assert_eq!(
            population,
            vec![GroupRow {
                cs_fips: "A".to_string(),
                age_id: 2,
                group_id: None,
                pop: 3,
                pop_male: 2,
                pop_female: 1,
            }]
        );

        let diseases = GroupPipeline::unwinding(IdList::Diseases).run(&stats);
        assert_eq!(
            diseases,
            vec![GroupRow {
                cs_fips: "A".to_string(),
                age_id: 2,
                group_id: Some(7),
                pop: 2,
                pop_male: 1,
                pop_female: 1,
            }]
        );
    }

    #[test]
    fn test_deceased_records_are_excluded() {
        let mut dead = stat("A", 1, "male", &[7]);
        dead.deceased = true;
        let stats = vec![dead, stat("A", 1, "female", &[7])];

        for pipeline in [
            GroupPipeline::population(),
            GroupPipeline::unwinding(IdList::Diseases),
        ] {
            let rows = pipeline.run(&stats);
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].pop, 1);
            assert_eq!(rows[0].pop_male, 0);
        }
    }

    #[test]
    fn test_untracked_ids_are_dropped_when_unwinding() {
        let stats = vec![stat("B", 3, "female", &[UNMAPPED_ID, 0, 4])];

        let rows = GroupPipeline::unwinding(IdList::Diseases).run(&stats);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group_id, Some(4));
    }

    #[test]
    fn test_missing_geo_groups_under_empty_code() {
        let stats = vec![stat("", 1, "other", &[]), stat("C", 1, "male", &[])];

        let rows = GroupPipeline::population().run(&stats);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cs_fips, "");
        assert_eq!(rows[0].pop, 1);
        assert_eq!(rows[0].pop_male + rows[0].pop_female, 0);
        assert_eq!(rows[1].cs_fips, "C");
    }
}
