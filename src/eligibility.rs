//! maps each duty to the set of people who may be assigned to it.

use std::collections::{HashMap, HashSet};

use crate::model::{DutyId, Person, PersonId, Preference};

/// `eligible(d) = { person p | preference(p, d).value > 0 and p.active }`,
/// built once per optimization run by scanning preferences restricted to
/// active people.
#[derive(Debug, Default, Clone)]
pub struct EligibilityIndex {
    by_duty: HashMap<DutyId, HashSet<PersonId>>,
}

impl EligibilityIndex {
    pub fn build(active_persons: &[Person], preferences: &[Preference]) -> Self {
        let active: HashSet<&PersonId> = active_persons.iter().map(|p| &p.id).collect();
        let mut by_duty: HashMap<DutyId, HashSet<PersonId>> = HashMap::new();

        for pref in preferences {
            if pref.value > 0.0 && active.contains(&pref.person_id) {
                by_duty
                    .entry(pref.duty_id.clone())
                    .or_default()
                    .insert(pref.person_id.clone());
            }
        }

        Self { by_duty }
    }

    pub fn is_eligible(&self, person: &PersonId, duty: &DutyId) -> bool {
        self.by_duty
            .get(duty)
            .map(|people| people.contains(person))
            .unwrap_or(false)
    }

    pub fn eligible_for(&self, duty: &DutyId) -> HashSet<PersonId> {
        self.by_duty.get(duty).cloned().unwrap_or_default()
    }
}
