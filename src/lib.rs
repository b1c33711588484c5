//! fair monthly duty scheduling: expand a month's calendar into fillable
//! slots, weigh them against each person's historical fairness stats, and
//! hand the result to an ILP solver to produce one assignment per slot.
//!
//! the four operations a caller drives a month through are
//! [`generate_schedule`], [`save_assignments`], [`clear_assignments`] and
//! [`promote_to_official`].

pub mod calendar;
pub mod config;
pub mod constraints;
pub mod eligibility;
pub mod error;
pub mod keys;
pub mod model;
pub mod optimize;
pub mod repository;
pub mod snapshot;
pub mod stats;
pub mod solver;

use std::collections::HashMap;

use chrono::Datelike;
use tracing::info;

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::keys::{PersonKey, SlotKey};
use crate::model::{PersonId, ScheduleVersionId};
use crate::optimize::ScheduleInput;
use crate::repository::Repository;

/// runs the optimizer for the month `version` covers and returns the
/// decoded `slot -> person` assignment, keyed by the stable textual keys
/// used at the API boundary. does not persist anything; call
/// [`save_assignments`] with the result to commit it.
///
/// `locked` pins specific slots to specific people regardless of what the
/// optimizer would otherwise choose (e.g. an admin override); every
/// locked slot must belong to the expanded month or this returns
/// [`CoreError::SlotNotInMonth`].
pub fn generate_schedule(
    repo: &dyn Repository,
    version_id: &ScheduleVersionId,
    config: &CoreConfig,
    locked: &HashMap<SlotKey, PersonKey>,
) -> Result<Vec<(SlotKey, PersonKey)>, CoreError> {
    let version = repo
        .load_version(version_id)?
        .ok_or_else(|| CoreError::PersistenceError(format!("unknown version {version_id}")))?;

    let active_persons = repo.load_active_persons()?;
    let services = repo.load_services_with_duties()?;
    let preferences = repo.load_preferences()?;

    let by_key: HashMap<PersonKey, PersonId> = active_persons
        .iter()
        .map(|p| (PersonKey::of(p), p.id.clone()))
        .collect();

    let mut locked_by_id = HashMap::with_capacity(locked.len());
    for (slot, key) in locked {
        let person_id = by_key
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::UnknownPerson { key: key.clone() })?;
        locked_by_id.insert(slot.clone(), person_id);
    }

    let (parent_assignments, parent_stats) = match &version.parent_version {
        Some(parent) => (repo.load_parent_assignments(parent)?, repo.load_parent_stats(parent)?),
        None => (Vec::new(), HashMap::new()),
    };

    let year = version.month_date.year();
    let month = version.month_date.month();

    optimize::validate_locked(&locked_by_id, year, month, &services)?;

    let input = ScheduleInput {
        year,
        month,
        services: &services,
        active_persons: &active_persons,
        preferences: &preferences,
        parent_assignments: &parent_assignments,
        parent_stats: &parent_stats,
        locked: &locked_by_id,
        config,
    };

    info!(version = %version_id, year, month, "generating schedule");
    let decoded = optimize::generate_schedule(&input)?;

    let id_to_key: HashMap<PersonId, PersonKey> = active_persons
        .iter()
        .map(|p| (p.id.clone(), PersonKey::of(p)))
        .collect();

    decoded
        .into_iter()
        .map(|(slot, person_id)| {
            let key = id_to_key
                .get(&person_id)
                .cloned()
                .ok_or_else(|| CoreError::UnknownPerson {
                    key: PersonKey(person_id.to_string()),
                })?;
            Ok((slot, key))
        })
        .collect()
}

/// the logical Generate endpoint's wire shape (spec.md §6): raw
/// `{slot_key: person_key}` string pairs, as they'd arrive over the
/// out-of-scope HTTP/form surface. Parses every slot key with
/// [`SlotKey::parse`] before handing off to [`generate_schedule`], so a
/// malformed slot key or unknown duty id surfaces as
/// [`CoreError::InvalidSlotKey`] rather than reaching the optimizer at all.
pub fn generate_schedule_from_raw_keys(
    repo: &dyn Repository,
    version_id: &ScheduleVersionId,
    config: &CoreConfig,
    locked: &HashMap<String, String>,
) -> Result<Vec<(SlotKey, PersonKey)>, CoreError> {
    let mut typed = HashMap::with_capacity(locked.len());
    for (slot_key, person_key) in locked {
        typed.insert(SlotKey::parse(slot_key)?, PersonKey(person_key.clone()));
    }
    generate_schedule(repo, version_id, config, &typed)
}

/// persists a generated assignment against `version`. resolves each
/// person key back to the person id the repository keys assignments by.
pub fn save_assignments(
    repo: &dyn Repository,
    version_id: &ScheduleVersionId,
    assignments: &[(SlotKey, PersonKey)],
) -> Result<(), CoreError> {
    let active_persons = repo.load_active_persons()?;
    let by_key: HashMap<PersonKey, PersonId> = active_persons
        .iter()
        .map(|p| (PersonKey::of(p), p.id.clone()))
        .collect();

    let mut resolved = Vec::with_capacity(assignments.len());
    for (slot, key) in assignments {
        let person_id = by_key
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::UnknownPerson { key: key.clone() })?;
        resolved.push((slot.clone(), person_id));
    }

    repo.save_assignments(version_id, &resolved)
}

/// drops every assignment bound to `version`, e.g. before regenerating a
/// draft from scratch.
pub fn clear_assignments(repo: &dyn Repository, version_id: &ScheduleVersionId) -> Result<(), CoreError> {
    repo.clear_assignments(version_id)
}

/// promotes `version` to official and materializes its fairness
/// snapshot. only available against the in-memory repository today: the
/// trait-level `Repository` doesn't expose enough to mint new snapshot
/// row ids generically, so a real backend implements this operation
/// itself against its own id allocation.
pub fn promote_to_official(
    repo: &repository::InMemoryRepository,
    version_id: &ScheduleVersionId,
) -> Result<(), CoreError> {
    snapshot::promote_to_official(repo, version_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Duty, Person, Preference, Service, ServiceDuties};
    use chrono::NaiveTime;

    fn demo_repo() -> repository::InMemoryRepository {
        let repo = repository::InMemoryRepository::new();
        repo.seed_persons(vec![Person {
            id: "a".into(),
            first_name: "Alice".into(),
            last_name: "Adams".into(),
            active: true,
        }]);
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
        repo.seed_preferences(vec![Preference {
            person_id: "a".into(),
            duty_id: "reader".into(),
            value: 1.0,
        }]);
        repo.seed_version(crate::model::ScheduleVersion {
            id: "draft".into(),
            name: "draft".into(),
            month_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            creator: "a".into(),
            parent_version: None,
            is_official: false,
        });
        repo
    }

    #[test]
    fn generate_schedule_from_raw_keys_rejects_a_malformed_slot_key() {
        let repo = demo_repo();
        let config = CoreConfig::default();
        let mut locked = HashMap::new();
        locked.insert("not-a-slot-key".to_string(), "Adams, Alice".to_string());

        let err = generate_schedule_from_raw_keys(&repo, &"draft".into(), &config, &locked).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSlotKey { .. }));
    }

    #[test]
    fn generate_schedule_from_raw_keys_parses_well_formed_locks() {
        let repo = demo_repo();
        let config = CoreConfig {
            cold_start_seed: Some(1),
            ..CoreConfig::default()
        };
        let mut locked = HashMap::new();
        locked.insert("2025-3-2-reader".to_string(), "Adams, Alice".to_string());

        let schedule = generate_schedule_from_raw_keys(&repo, &"draft".into(), &config, &locked)
            .expect("well-formed locked key should parse and solve");
        assert!(schedule
            .iter()
            .any(|(slot, person)| slot.to_string() == "2025-3-2-reader" && person.0 == "Adams, Alice"));
    }
}
