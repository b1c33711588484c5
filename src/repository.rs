//! the persistence seam: everything the optimizer and snapshot logic need
//! to read and write lives behind this trait, so a caller can swap in a
//! real database without touching `optimize.rs` or `snapshot.rs`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::CoreError;
use crate::keys::SlotKey;
use crate::model::{
    Assignment, Person, PersonId, Preference, ScheduleVersion, ScheduleVersionId, ServiceDuties,
    SnapshotRow, SnapshotRowId,
};
use crate::stats::StatsTriple;

pub trait Repository {
    fn load_active_persons(&self) -> Result<Vec<Person>, CoreError>;
    fn load_services_with_duties(&self) -> Result<Vec<ServiceDuties>, CoreError>;
    fn load_preferences(&self) -> Result<Vec<Preference>, CoreError>;

    /// the assignments bound to `version` (recursing to the version chain
    /// is the caller's job; this returns exactly one version's rows).
    fn load_parent_assignments(&self, version: &ScheduleVersionId) -> Result<Vec<Assignment>, CoreError>;

    /// every `SnapshotRow` bound to `version`, keyed by (person, duty).
    fn load_parent_stats(
        &self,
        version: &ScheduleVersionId,
    ) -> Result<HashMap<(PersonId, crate::model::DutyId), StatsTriple>, CoreError>;

    fn save_assignments(
        &self,
        version: &ScheduleVersionId,
        assignments: &[(SlotKey, PersonId)],
    ) -> Result<(), CoreError>;

    fn clear_assignments(&self, version: &ScheduleVersionId) -> Result<(), CoreError>;

    fn write_snapshot(&self, version: &ScheduleVersionId, rows: Vec<SnapshotRow>) -> Result<(), CoreError>;

    fn bind_existing_snapshot(
        &self,
        version: &ScheduleVersionId,
        snapshot_id: &SnapshotRowId,
    ) -> Result<(), CoreError>;

    fn load_version(&self, id: &ScheduleVersionId) -> Result<Option<ScheduleVersion>, CoreError>;

    /// all versions (any official status) covering the same calendar
    /// month as `month_date`, needed to demote a sibling on promotion.
    fn versions_for_month(&self, month_date: NaiveDate) -> Result<Vec<ScheduleVersion>, CoreError>;

    fn set_official(&self, version: &ScheduleVersionId, is_official: bool) -> Result<(), CoreError>;

    /// a version's own assignments, i.e. rows with
    /// `schedule_version == Some(version)` -- distinct from
    /// `load_parent_assignments`, which is called with some *other*
    /// version's id (typically `version.parent_version`).
    fn load_own_assignments(&self, version: &ScheduleVersionId) -> Result<Vec<Assignment>, CoreError>;

    /// every assignment ever recorded, across every version and any
    /// pre-versioning historical rows with no `schedule_version` at all.
    /// `actual_avg` (spec.md §4.3) is defined over this full history, not
    /// over any one version's own rows.
    fn load_all_assignments(&self) -> Result<Vec<Assignment>, CoreError>;

    /// the most recently created snapshot row for `(person, duty)` across
    /// all versions, used to decide whether promotion can reuse a row or
    /// must create one.
    fn latest_snapshot_row(
        &self,
        person: &PersonId,
        duty: &crate::model::DutyId,
    ) -> Result<Option<SnapshotRow>, CoreError>;

    /// removes every snapshot row whose `version_set` is exactly
    /// `{version}`, returning their ids. called at the start of
    /// (re-)promotion so a repeated promotion of the same version stays
    /// idempotent instead of accumulating orphaned rows.
    fn delete_snapshot_rows_bound_only_to(
        &self,
        version: &ScheduleVersionId,
    ) -> Result<Vec<SnapshotRowId>, CoreError>;
}

/// an in-memory fixture used by the CLI preview tool and the integration
/// tests; not meant for concurrent production use.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    persons: Vec<Person>,
    services: Vec<ServiceDuties>,
    preferences: Vec<Preference>,
    assignments: Vec<Assignment>,
    versions: HashMap<ScheduleVersionId, ScheduleVersion>,
    snapshot_rows: HashMap<SnapshotRowId, SnapshotRow>,
    next_row_id: u64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_persons(&self, persons: Vec<Person>) {
        self.lock().persons = persons;
    }

    pub fn seed_services(&self, services: Vec<ServiceDuties>) {
        self.lock().services = services;
    }

    pub fn seed_preferences(&self, preferences: Vec<Preference>) {
        self.lock().preferences = preferences;
    }

    pub fn seed_version(&self, version: ScheduleVersion) {
        self.lock().versions.insert(version.id.clone(), version);
    }

    pub fn seed_assignments(&self, assignments: Vec<Assignment>) {
        self.lock().assignments.extend(assignments);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Repository for InMemoryRepository {
    fn load_active_persons(&self) -> Result<Vec<Person>, CoreError> {
        Ok(self.lock().persons.iter().filter(|p| p.active).cloned().collect())
    }

    fn load_services_with_duties(&self) -> Result<Vec<ServiceDuties>, CoreError> {
        Ok(self.lock().services.clone())
    }

    fn load_preferences(&self) -> Result<Vec<Preference>, CoreError> {
        Ok(self.lock().preferences.clone())
    }

    fn load_parent_assignments(&self, version: &ScheduleVersionId) -> Result<Vec<Assignment>, CoreError> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|a| a.schedule_version.as_ref() == Some(version))
            .cloned()
            .collect())
    }

    fn load_parent_stats(
        &self,
        version: &ScheduleVersionId,
    ) -> Result<HashMap<(PersonId, crate::model::DutyId), StatsTriple>, CoreError> {
        Ok(self
            .lock()
            .snapshot_rows
            .values()
            .filter(|row| row.version_set.contains(version))
            .map(|row| {
                (
                    (row.person_id.clone(), row.duty_id.clone()),
                    StatsTriple {
                        ideal_avg: row.ideal_avg,
                        actual_avg: row.actual_avg,
                        delta: row.delta,
                    },
                )
            })
            .collect())
    }

    fn save_assignments(
        &self,
        version: &ScheduleVersionId,
        assignments: &[(SlotKey, PersonId)],
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        for (slot, person) in assignments {
            state.assignments.push(Assignment {
                person_id: person.clone(),
                duty_id: slot.duty.clone(),
                assigned_at: slot.date,
                schedule_version: Some(version.clone()),
            });
        }
        Ok(())
    }

    fn clear_assignments(&self, version: &ScheduleVersionId) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.assignments.retain(|a| a.schedule_version.as_ref() != Some(version));
        Ok(())
    }

    fn write_snapshot(&self, version: &ScheduleVersionId, rows: Vec<SnapshotRow>) -> Result<(), CoreError> {
        let mut state = self.lock();
        for mut row in rows {
            row.version_set.insert(version.clone());
            state.snapshot_rows.insert(row.id.clone(), row);
        }
        Ok(())
    }

    fn bind_existing_snapshot(
        &self,
        version: &ScheduleVersionId,
        snapshot_id: &SnapshotRowId,
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        let row = state
            .snapshot_rows
            .get_mut(snapshot_id)
            .ok_or_else(|| CoreError::PersistenceError(format!("unknown snapshot row {snapshot_id}")))?;
        row.version_set.insert(version.clone());
        Ok(())
    }

    fn load_version(&self, id: &ScheduleVersionId) -> Result<Option<ScheduleVersion>, CoreError> {
        Ok(self.lock().versions.get(id).cloned())
    }

    fn versions_for_month(&self, month_date: NaiveDate) -> Result<Vec<ScheduleVersion>, CoreError> {
        Ok(self
            .lock()
            .versions
            .values()
            .filter(|v| v.month_date == month_date)
            .cloned()
            .collect())
    }

    fn set_official(&self, version: &ScheduleVersionId, is_official: bool) -> Result<(), CoreError> {
        let mut state = self.lock();
        let entry = state
            .versions
            .get_mut(version)
            .ok_or_else(|| CoreError::PersistenceError(format!("unknown version {version}")))?;
        entry.is_official = is_official;
        Ok(())
    }

    fn load_own_assignments(&self, version: &ScheduleVersionId) -> Result<Vec<Assignment>, CoreError> {
        self.load_parent_assignments(version)
    }

    fn load_all_assignments(&self) -> Result<Vec<Assignment>, CoreError> {
        Ok(self.lock().assignments.clone())
    }

    fn latest_snapshot_row(
        &self,
        person: &PersonId,
        duty: &crate::model::DutyId,
    ) -> Result<Option<SnapshotRow>, CoreError> {
        Ok(self
            .lock()
            .snapshot_rows
            .values()
            .filter(|row| &row.person_id == person && &row.duty_id == duty)
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    fn delete_snapshot_rows_bound_only_to(
        &self,
        version: &ScheduleVersionId,
    ) -> Result<Vec<SnapshotRowId>, CoreError> {
        let mut state = self.lock();
        let to_remove: Vec<SnapshotRowId> = state
            .snapshot_rows
            .values()
            .filter(|row| row.version_set.len() == 1 && row.version_set.contains(version))
            .map(|row| row.id.clone())
            .collect();
        for id in &to_remove {
            state.snapshot_rows.remove(id);
        }
        Ok(to_remove)
    }
}

impl InMemoryRepository {
    /// the next monotonic row id, exposed for `snapshot.rs` to mint ids
    /// without reaching into the lock directly.
    pub fn next_snapshot_row_id(&self) -> SnapshotRowId {
        let mut state = self.lock();
        state.next_row_id += 1;
        SnapshotRowId::from(format!("row-{}", state.next_row_id))
    }
}

/// builds a `created_at` timestamp without reaching for `chrono::Local::now`,
/// so promotion and its tests stay reproducible.
pub fn stamp(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .expect("valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> Person {
        Person {
            id: id.into(),
            first_name: "F".into(),
            last_name: "L".into(),
            active: true,
        }
    }

    #[test]
    fn save_and_clear_assignments_round_trip() {
        let repo = InMemoryRepository::new();
        let version = ScheduleVersionId::from("v1");
        let slot = SlotKey::new(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(), "d".into());
        repo.save_assignments(&version, &[(slot.clone(), PersonId::from("a"))]).unwrap();

        let loaded = repo.load_parent_assignments(&version).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].person_id, PersonId::from("a"));

        repo.clear_assignments(&version).unwrap();
        assert!(repo.load_parent_assignments(&version).unwrap().is_empty());
    }

    #[test]
    fn latest_snapshot_row_picks_the_most_recent() {
        let repo = InMemoryRepository::new();
        let older = SnapshotRow {
            id: "r1".into(),
            person_id: "a".into(),
            duty_id: "d".into(),
            ideal_avg: 0.5,
            actual_avg: 0.4,
            delta: -0.2,
            created_at: stamp(2025, 1, 1, 0, 0, 0),
            version_set: Default::default(),
        };
        let newer = SnapshotRow {
            id: "r2".into(),
            created_at: stamp(2025, 2, 1, 0, 0, 0),
            ..older.clone()
        };
        repo.write_snapshot(&"v1".into(), vec![older]).unwrap();
        repo.write_snapshot(&"v2".into(), vec![newer]).unwrap();

        let latest = repo
            .latest_snapshot_row(&"a".into(), &"d".into())
            .unwrap()
            .expect("a row");
        assert_eq!(latest.id, SnapshotRowId::from("r2"));
    }

    #[test]
    fn active_filter_excludes_inactive_persons() {
        let repo = InMemoryRepository::new();
        let mut inactive = person("b");
        inactive.active = false;
        repo.seed_persons(vec![person("a"), inactive]);

        let active = repo.load_active_persons().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, PersonId::from("a"));
    }
}
