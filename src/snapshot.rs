//! promotes a draft `ScheduleVersion` to official status and materializes
//! the fairness snapshot that the next month's optimizer run will read
//! back as `parent_stats`.

use std::collections::HashMap;

use chrono::Datelike;

use crate::eligibility::EligibilityIndex;
use crate::error::CoreError;
use crate::model::{DutyId, PersonId, SnapshotRow};
use crate::repository::{InMemoryRepository, Repository};
use crate::stats;

/// promotes `version` to official: demotes any other version covering the
/// same month, then builds (or rebinds) one `SnapshotRow` per relevant
/// (person, duty) pair.
///
/// relevant people are this version's assignees plus every active person
/// with at least one positive preference; relevant duties are every duty
/// assigned in this version plus every duty any relevant person prefers.
/// a pair this version actually assigned always gets a freshly computed
/// row; every other relevant pair reuses the latest existing row across
/// prior official versions (created once, bound to many), falling back to
/// a fresh zeroed row the first time a pair is seen. `actual_avg` is always
/// computed over the full assignment history (`Repository::load_all_assignments`),
/// never over just this version's own rows, per the stats engine's
/// "all historical assignments" definition.
pub fn promote_to_official(repo: &InMemoryRepository, version_id: &crate::model::ScheduleVersionId) -> Result<(), CoreError> {
    let version = repo
        .load_version(version_id)?
        .ok_or_else(|| CoreError::PersistenceError(format!("unknown version {version_id}")))?;

    for sibling in repo.versions_for_month(version.month_date)? {
        if &sibling.id != version_id && sibling.is_official {
            repo.set_official(&sibling.id, false)?;
        }
    }

    // make re-promotion of the same version idempotent: drop whatever
    // this version solely owned from a prior promotion before recomputing.
    repo.delete_snapshot_rows_bound_only_to(version_id)?;

    let own_assignments = repo.load_own_assignments(version_id)?;
    let all_assignments = repo.load_all_assignments()?;
    let active_persons = repo.load_active_persons()?;
    let preferences = repo.load_preferences()?;
    let eligibility = EligibilityIndex::build(&active_persons, &preferences);
    let preference_weights: HashMap<(PersonId, DutyId), f64> = preferences
        .iter()
        .map(|p| ((p.person_id.clone(), p.duty_id.clone()), p.value))
        .collect();

    let assigned_pairs: std::collections::BTreeSet<(PersonId, DutyId)> = own_assignments
        .iter()
        .map(|a| (a.person_id.clone(), a.duty_id.clone()))
        .collect();

    let relevant_people: std::collections::BTreeSet<PersonId> = assigned_pairs
        .iter()
        .map(|(p, _)| p.clone())
        .chain(
            active_persons
                .iter()
                .filter(|p| preferences.iter().any(|pref| &pref.person_id == &p.id && pref.value > 0.0))
                .map(|p| p.id.clone()),
        )
        .collect();

    let relevant_duties: std::collections::BTreeSet<DutyId> = assigned_pairs
        .iter()
        .map(|(_, d)| d.clone())
        .chain(preferences.iter().filter(|p| relevant_people.contains(&p.person_id) && p.value > 0.0).map(|p| p.duty_id.clone()))
        .collect();

    let mut fresh_rows = Vec::new();
    let mut reused_ids = Vec::new();

    for person in &relevant_people {
        for duty in &relevant_duties {
            let key = (person.clone(), duty.clone());
            if assigned_pairs.contains(&key) {
                let triple = stats::triple(person, duty, &eligibility, &preference_weights, &all_assignments);
                fresh_rows.push(SnapshotRow {
                    id: repo.next_snapshot_row_id(),
                    person_id: person.clone(),
                    duty_id: duty.clone(),
                    ideal_avg: triple.ideal_avg,
                    actual_avg: triple.actual_avg,
                    delta: triple.delta,
                    created_at: crate::repository::stamp(version.month_date.year(), version.month_date.month(), 1, 0, 0, 0),
                    version_set: std::collections::BTreeSet::new(),
                });
                continue;
            }

            if !eligibility.is_eligible(person, duty) {
                continue;
            }

            match repo.latest_snapshot_row(person, duty)? {
                Some(row) => reused_ids.push(row.id),
                None => {
                    let triple = stats::triple(person, duty, &eligibility, &preference_weights, &all_assignments);
                    fresh_rows.push(SnapshotRow {
                        id: repo.next_snapshot_row_id(),
                        person_id: person.clone(),
                        duty_id: duty.clone(),
                        ideal_avg: triple.ideal_avg,
                        actual_avg: triple.actual_avg,
                        delta: triple.delta,
                        created_at: crate::repository::stamp(version.month_date.year(), version.month_date.month(), 1, 0, 0, 0),
                        version_set: std::collections::BTreeSet::new(),
                    });
                }
            }
        }
    }

    repo.write_snapshot(version_id, fresh_rows)?;
    for id in reused_ids {
        repo.bind_existing_snapshot(version_id, &id)?;
    }
    repo.set_official(version_id, true)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assignment, Duty, Person, Preference, ScheduleVersion, Service, ServiceDuties};
    use chrono::{NaiveDate, NaiveTime};

    fn fixture_repo() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.seed_persons(vec![
            Person { id: "a".into(), first_name: "A".into(), last_name: "Arthur".into(), active: true },
            Person { id: "b".into(), first_name: "B".into(), last_name: "Baker".into(), active: true },
        ]);
        repo.seed_services(vec![ServiceDuties {
            service: Service {
                id: "svc".into(),
                name: "Sunday".into(),
                weekday: Some(0),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            },
            duties: vec![Duty {
                id: "reader".into(),
                name: "Reader".into(),
                service_id: "svc".into(),
                order: 0,
                excludes: Default::default(),
                time_period: None,
            }],
        }]);
        repo.seed_preferences(vec![
            Preference { person_id: "a".into(), duty_id: "reader".into(), value: 1.0 },
            Preference { person_id: "b".into(), duty_id: "reader".into(), value: 1.0 },
        ]);
        repo
    }

    #[test]
    fn promotion_creates_rows_and_marks_version_official() {
        let repo = fixture_repo();
        let version = ScheduleVersion {
            id: "v1".into(),
            name: "March draft".into(),
            month_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            creator: "a".into(),
            parent_version: None,
            is_official: false,
        };
        repo.seed_version(version.clone());
        repo.seed_assignments(vec![Assignment {
            person_id: "a".into(),
            duty_id: "reader".into(),
            assigned_at: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            schedule_version: Some("v1".into()),
        }]);

        promote_to_official(&repo, &"v1".into()).unwrap();

        let loaded = repo.load_version(&"v1".into()).unwrap().unwrap();
        assert!(loaded.is_official);

        let stats = repo.load_parent_stats(&"v1".into()).unwrap();
        assert!(stats.contains_key(&(PersonId::from("a"), DutyId::from("reader"))));
    }

    #[test]
    fn promoting_a_second_version_demotes_the_first() {
        let repo = fixture_repo();
        let v1 = ScheduleVersion {
            id: "v1".into(),
            name: "first".into(),
            month_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            creator: "a".into(),
            parent_version: None,
            is_official: false,
        };
        let v2 = ScheduleVersion {
            id: "v2".into(),
            name: "second".into(),
            month_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            creator: "a".into(),
            parent_version: None,
            is_official: false,
        };
        repo.seed_version(v1);
        repo.seed_version(v2);

        promote_to_official(&repo, &"v1".into()).unwrap();
        promote_to_official(&repo, &"v2".into()).unwrap();

        assert!(!repo.load_version(&"v1".into()).unwrap().unwrap().is_official);
        assert!(repo.load_version(&"v2".into()).unwrap().unwrap().is_official);
    }

    #[test]
    fn actual_avg_is_computed_over_full_history_not_just_this_version() {
        let repo = fixture_repo();

        // pre-versioning historical assignments: no schedule_version at all,
        // three of them for "a" and one for "b".
        repo.seed_assignments(vec![
            Assignment {
                person_id: "a".into(),
                duty_id: "reader".into(),
                assigned_at: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
                schedule_version: None,
            },
            Assignment {
                person_id: "a".into(),
                duty_id: "reader".into(),
                assigned_at: NaiveDate::from_ymd_opt(2025, 1, 12).unwrap(),
                schedule_version: None,
            },
            Assignment {
                person_id: "a".into(),
                duty_id: "reader".into(),
                assigned_at: NaiveDate::from_ymd_opt(2025, 1, 19).unwrap(),
                schedule_version: None,
            },
            Assignment {
                person_id: "b".into(),
                duty_id: "reader".into(),
                assigned_at: NaiveDate::from_ymd_opt(2025, 1, 26).unwrap(),
                schedule_version: None,
            },
        ]);

        let version = ScheduleVersion {
            id: "v1".into(),
            name: "March draft".into(),
            month_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            creator: "a".into(),
            parent_version: None,
            is_official: false,
        };
        repo.seed_version(version);
        // this version's own assignment gives "b" a single march slot.
        repo.seed_assignments(vec![Assignment {
            person_id: "b".into(),
            duty_id: "reader".into(),
            assigned_at: NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
            schedule_version: Some("v1".into()),
        }]);

        promote_to_official(&repo, &"v1".into()).unwrap();

        let stats = repo.load_parent_stats(&"v1".into()).unwrap();
        // across all five historical assignments, "a" has 3/5 and "b" has
        // 2/5 -- not the 0/1 and 1/1 a this-version-only computation would
        // have produced.
        let a = stats.get(&(PersonId::from("a"), DutyId::from("reader"))).unwrap();
        let b = stats.get(&(PersonId::from("b"), DutyId::from("reader"))).unwrap();
        assert_eq!(a.actual_avg, 0.6);
        assert_eq!(b.actual_avg, 0.4);
    }
}
