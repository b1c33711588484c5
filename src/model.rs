//! core entities: people, services, duties, preferences, assignments and
//! the version/snapshot machinery that ties a month's plan to its history.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(PersonId);
string_id!(DutyId);
string_id!(ServiceId);
string_id!(ScheduleVersionId);
string_id!(SnapshotRowId);

/// a person who can be assigned to duties. created externally; this crate
/// never creates or renames one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
}

impl Person {
    /// the canonical "Last, First" textual key used at the API boundary.
    pub fn inverted_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// a recurring commitment that owns zero or more duties.
///
/// `weekday` follows the Sunday=0 convention used throughout calendar
/// expansion; `None` means "once per week, on the earliest day of the week
/// that has some service" (see `calendar::expand`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub weekday: Option<u8>,
    pub start_time: NaiveTime,
}

/// a single fillable role, owned by a service. `excludes` is a symmetric
/// adjacency set on duty ids, reflexive by convention (a duty always
/// excludes itself), so "pairwise exclusion" collapses to one check:
/// `excludes.contains(other)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duty {
    pub id: DutyId,
    pub name: String,
    pub service_id: ServiceId,
    pub order: i32,
    pub excludes: BTreeSet<DutyId>,
    /// duplicates the owning service's `weekday`; carried for display
    /// fidelity only and never branched on (the service's weekday is
    /// authoritative).
    pub time_period: Option<String>,
}

/// a service bundled with the duties it owns, as returned by
/// `Repository::load_services_with_duties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDuties {
    pub service: Service,
    pub duties: Vec<Duty>,
}

/// a (person, duty) eligibility weight. `value > 0` means eligible;
/// `value == 0` means not eligible. the same number doubles as a fairness
/// weight in the ideal-average formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub person_id: PersonId,
    pub duty_id: DutyId,
    pub value: f64,
}

/// a single fulfilled slot: person `person_id` did duty `duty_id` on
/// `assigned_at`. immutable once bound to an official schedule version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub person_id: PersonId,
    pub duty_id: DutyId,
    pub assigned_at: NaiveDate,
    pub schedule_version: Option<ScheduleVersionId>,
}

/// a month-bearing draft or official plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleVersion {
    pub id: ScheduleVersionId,
    pub name: String,
    /// the 1st of the month this version covers.
    pub month_date: NaiveDate,
    pub creator: PersonId,
    /// the previous official version for the preceding month; the sole
    /// source of truth for stats consumed by the optimizer.
    pub parent_version: Option<ScheduleVersionId>,
    pub is_official: bool,
}

/// one frozen (person, duty) fairness triple. bound to one or more
/// schedule versions via `version_set`; reusing a row means adding a
/// version id to this set, never cloning the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: SnapshotRowId,
    pub person_id: PersonId,
    pub duty_id: DutyId,
    pub ideal_avg: f64,
    pub actual_avg: f64,
    pub delta: f64,
    pub created_at: NaiveDateTime,
    pub version_set: BTreeSet<ScheduleVersionId>,
}
