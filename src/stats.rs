//! per-(person, duty) fairness statistics: how much of a duty's history a
//! person has actually received versus their weight-proportional share.

use std::collections::HashMap;

use crate::eligibility::EligibilityIndex;
use crate::model::{Assignment, DutyId, PersonId};

/// stored at 8 decimal places, per the fairness snapshot contract.
pub fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsTriple {
    pub ideal_avg: f64,
    pub actual_avg: f64,
    pub delta: f64,
}

impl StatsTriple {
    pub const ZERO: StatsTriple = StatsTriple {
        ideal_avg: 0.0,
        actual_avg: 0.0,
        delta: 0.0,
    };
}

/// `count(assignments of d to p) / count(assignments of d)`, zero if the
/// duty has never been assigned.
pub fn actual_avg(person: &PersonId, duty: &DutyId, assignments: &[Assignment]) -> f64 {
    let total = assignments.iter().filter(|a| &a.duty_id == duty).count();
    if total == 0 {
        return 0.0;
    }
    let for_person = assignments
        .iter()
        .filter(|a| &a.duty_id == duty && &a.person_id == person)
        .count();
    round8(for_person as f64 / total as f64)
}

/// `preference(p,d).value / sum_{q in eligible(d)} preference(q,d).value`,
/// falling back to a uniform share when every eligible weight is zero, and
/// to zero when `p` is not eligible for `d`.
pub fn ideal_avg(
    person: &PersonId,
    duty: &DutyId,
    eligibility: &EligibilityIndex,
    preferences: &HashMap<(PersonId, DutyId), f64>,
) -> f64 {
    if !eligibility.is_eligible(person, duty) {
        return 0.0;
    }
    let eligible = eligibility.eligible_for(duty);
    let total_weight: f64 = eligible
        .iter()
        .map(|p| {
            preferences
                .get(&(p.clone(), duty.clone()))
                .copied()
                .unwrap_or(0.0)
        })
        .sum();

    if total_weight == 0.0 {
        return if eligible.is_empty() {
            0.0
        } else {
            round8(1.0 / eligible.len() as f64)
        };
    }

    let weight = preferences
        .get(&(person.clone(), duty.clone()))
        .copied()
        .unwrap_or(0.0);
    round8(weight / total_weight)
}

/// `(actual - ideal) / ideal` when `ideal > 0`, else `0`.
pub fn delta(actual: f64, ideal: f64) -> f64 {
    if ideal > 0.0 {
        round8((actual - ideal) / ideal)
    } else {
        0.0
    }
}

pub fn triple(
    person: &PersonId,
    duty: &DutyId,
    eligibility: &EligibilityIndex,
    preferences: &HashMap<(PersonId, DutyId), f64>,
    assignments: &[Assignment],
) -> StatsTriple {
    let ideal = ideal_avg(person, duty, eligibility, preferences);
    let actual = actual_avg(person, duty, assignments);
    StatsTriple {
        ideal_avg: ideal,
        actual_avg: actual,
        delta: delta(actual, ideal),
    }
}
