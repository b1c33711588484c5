//! translates the domain rules into the seven linear constraint families,
//! plus the decision-variable universe they all share. each family is its
//! own function, mirroring the one-stub-per-rule shape of the constraint
//! builder this was generalized from.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::calendar::MonthLayout;
use crate::config::CoreConfig;
use crate::eligibility::EligibilityIndex;
use crate::keys::SlotKey;
use crate::model::{Assignment, Duty, DutyId, PersonId};
use crate::solver::{Solver, VarId, VarKind};

pub type VarIndex = HashMap<(SlotKey, PersonId), VarId>;

pub struct BuildContext<'a> {
    pub year: i32,
    pub month: u32,
    pub slots: &'a [SlotKey],
    pub duties: &'a HashMap<DutyId, Duty>,
    pub duty_weekday: &'a HashMap<DutyId, Option<u8>>,
    pub eligibility: &'a EligibilityIndex,
    pub parent_assignments: &'a [Assignment],
    pub locked: &'a HashMap<SlotKey, PersonId>,
    pub layout: &'a MonthLayout,
    pub config: &'a CoreConfig,
    pub effective_cap: &'a HashMap<PersonId, u32>,
}

fn slot_for_assignment(a: &Assignment) -> SlotKey {
    SlotKey::new(a.assigned_at, a.duty_id.clone())
}

/// persons whose assignment to `duty` is locked in, for the several
/// families that exempt them.
fn locked_persons_by_duty(locked: &HashMap<SlotKey, PersonId>) -> HashMap<DutyId, HashSet<PersonId>> {
    let mut out: HashMap<DutyId, HashSet<PersonId>> = HashMap::new();
    for (slot, person) in locked {
        out.entry(slot.duty.clone()).or_default().insert(person.clone());
    }
    out
}

/// the decision variable universe: every (slot, person) pair the
/// cartesian product of this month's slots against eligibility produces,
/// plus every pair from the parent version's assignments (to drive the
/// month-boundary constraint even when eligibility has since changed),
/// plus every locked pair (which may name a person ineligible by today's
/// preferences, an explicit override).
pub fn build_variables(solver: &mut dyn Solver, ctx: &BuildContext) -> VarIndex {
    let mut index = VarIndex::new();

    for slot in ctx.slots {
        for person in ctx.eligibility.eligible_for(&slot.duty) {
            index
                .entry((slot.clone(), person))
                .or_insert_with(|| solver.add_var(VarKind::Binary));
        }
    }
    for a in ctx.parent_assignments {
        let slot = slot_for_assignment(a);
        index
            .entry((slot, a.person_id.clone()))
            .or_insert_with(|| solver.add_var(VarKind::Binary));
    }
    for (slot, person) in ctx.locked {
        index
            .entry((slot.clone(), person.clone()))
            .or_insert_with(|| solver.add_var(VarKind::Binary));
    }

    index
}

/// family 1: every parent-version assignment is fixed to 1.
pub fn constrain_past_assignments(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    for a in ctx.parent_assignments {
        let slot = slot_for_assignment(a);
        if let Some(&var) = index.get(&(slot, a.person_id.clone())) {
            solver.add_linear_eq(&[(var, 1.0)], 1.0);
        }
    }
}

/// family 2: exactly one eligible person per slot.
pub fn constrain_one_person_per_slot(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    for slot in ctx.slots {
        let terms: Vec<(VarId, f64)> = ctx
            .eligibility
            .eligible_for(&slot.duty)
            .into_iter()
            .filter_map(|person| index.get(&(slot.clone(), person)).map(|&v| (v, 1.0)))
            .collect();
        solver.add_linear_eq(&terms, 1.0);
    }
}

/// family 3: no person may hold both halves of an excluded duty pair in
/// the same week.
pub fn constrain_excluded_duties(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    let mut duty_ids: Vec<&DutyId> = ctx.duties.keys().collect();
    duty_ids.sort();

    for i in 0..duty_ids.len() {
        for j in (i + 1)..duty_ids.len() {
            let (d1, d2) = (duty_ids[i], duty_ids[j]);
            if !ctx.duties[d1].excludes.contains(d2) {
                continue;
            }

            let eligible_both: Vec<PersonId> = ctx
                .eligibility
                .eligible_for(d1)
                .intersection(&ctx.eligibility.eligible_for(d2))
                .cloned()
                .collect();
            if eligible_both.is_empty() {
                continue;
            }

            let w1 = ctx.duty_weekday.get(d1).copied().flatten();
            let w2 = ctx.duty_weekday.get(d2).copied().flatten();
            let dates1 = ctx.layout.resolve(w1);
            let dates2 = ctx.layout.resolve(w2);

            for (date1, date2) in dates1.iter().zip(dates2.iter()) {
                let (Some(date1), Some(date2)) = (date1, date2) else {
                    continue; // sentinel: duty absent from this week
                };
                if date1 == date2 {
                    continue; // self-pair: both duties coincide on one day
                }
                let s1 = SlotKey::new(*date1, d1.clone());
                let s2 = SlotKey::new(*date2, d2.clone());

                for person in &eligible_both {
                    if let (Some(&v1), Some(&v2)) = (
                        index.get(&(s1.clone(), person.clone())),
                        index.get(&(s2.clone(), person.clone())),
                    ) {
                        solver.add_linear_le(&[(v1, 1.0), (v2, 1.0)], 1.0);
                    }
                }
            }
        }
    }
}

/// family 4: fair per-duty distribution, with an over-assignment cap that
/// tightens to "at most once" when there are more eligibles than slots.
pub fn constrain_fair_distribution(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    let locked_by_duty = locked_persons_by_duty(ctx.locked);

    let mut slots_by_duty: HashMap<DutyId, Vec<&SlotKey>> = HashMap::new();
    for slot in ctx.slots {
        slots_by_duty.entry(slot.duty.clone()).or_default().push(slot);
    }

    for (duty, duty_slots) in &slots_by_duty {
        let eligible = ctx.eligibility.eligible_for(duty);
        let n = eligible.len();
        let k = duty_slots.len();
        if n == 0 || k == 0 {
            continue;
        }
        let exempt = locked_by_duty.get(duty);

        for person in &eligible {
            if exempt.map(|s| s.contains(person)).unwrap_or(false) {
                continue;
            }
            let terms: Vec<(VarId, f64)> = duty_slots
                .iter()
                .filter_map(|slot| index.get(&((*slot).clone(), person.clone())).map(|&v| (v, 1.0)))
                .collect();
            if terms.is_empty() {
                continue;
            }

            if n > k {
                solver.add_linear_le(&terms, 1.0);
            } else {
                let max_times = (k as f64 / n as f64).ceil();
                solver.add_linear_le(&terms, max_times);
                let at_least_once: Vec<(VarId, f64)> =
                    terms.iter().map(|(v, c)| (*v, -*c)).collect();
                solver.add_linear_le(&at_least_once, -1.0);
            }
        }
    }
}

/// family 5: no person exceeds their total cap for the month (current
/// month's slots only; the parent-month variables kept for family 6 don't
/// count against it).
pub fn constrain_per_person_cap(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    let mut vars_by_person: HashMap<PersonId, Vec<VarId>> = HashMap::new();
    for ((slot, person), &var) in index {
        if slot.date.year() == ctx.year && slot.date.month() == ctx.month {
            vars_by_person.entry(person.clone()).or_default().push(var);
        }
    }

    for (person, vars) in vars_by_person {
        let cap = ctx
            .effective_cap
            .get(&person)
            .copied()
            .unwrap_or(ctx.config.max_per_person);
        let terms: Vec<(VarId, f64)> = vars.into_iter().map(|v| (v, 1.0)).collect();
        solver.add_linear_le(&terms, cap as f64);
    }
}

/// family 6: the same person may not hold consecutive occurrences of a
/// duty spanning the month boundary (the week before this month's first
/// day through the end of the month).
pub fn constrain_month_boundary(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    let locked_by_duty = locked_persons_by_duty(ctx.locked);
    let month_start = NaiveDate::from_ymd_opt(ctx.year, ctx.month, 1).expect("valid month");
    let boundary = month_start - Duration::days(7);

    enum Entry {
        Fixed(NaiveDate, PersonId),
        Slot(NaiveDate),
    }
    impl Entry {
        fn date(&self) -> NaiveDate {
            match self {
                Entry::Fixed(d, _) => *d,
                Entry::Slot(d) => *d,
            }
        }
    }

    let mut timelines: HashMap<DutyId, Vec<Entry>> = HashMap::new();
    for a in ctx.parent_assignments {
        if a.assigned_at >= boundary {
            timelines
                .entry(a.duty_id.clone())
                .or_default()
                .push(Entry::Fixed(a.assigned_at, a.person_id.clone()));
        }
    }
    for slot in ctx.slots {
        timelines
            .entry(slot.duty.clone())
            .or_default()
            .push(Entry::Slot(slot.date));
    }

    for (duty, mut timeline) in timelines {
        let eligible = ctx.eligibility.eligible_for(&duty);
        if eligible.len() < 2 {
            continue;
        }
        let exempt = locked_by_duty.get(&duty);
        timeline.sort_by_key(|e| e.date());

        for pair in timeline.windows(2) {
            let earlier = SlotKey::new(pair[0].date(), duty.clone());
            let later = SlotKey::new(pair[1].date(), duty.clone());

            for person in &eligible {
                if exempt.map(|s| s.contains(person)).unwrap_or(false) {
                    continue;
                }
                if let (Some(&v1), Some(&v2)) = (
                    index.get(&(earlier.clone(), person.clone())),
                    index.get(&(later.clone(), person.clone())),
                ) {
                    solver.add_linear_le(&[(v1, 1.0), (v2, 1.0)], 1.0);
                }
            }
        }
    }
}

/// family 7: every caller-provided locked pair is fixed to 1.
pub fn constrain_locked(solver: &mut dyn Solver, index: &VarIndex, ctx: &BuildContext) {
    for (slot, person) in ctx.locked {
        if let Some(&var) = index.get(&(slot.clone(), person.clone())) {
            solver.add_linear_eq(&[(var, 1.0)], 1.0);
        }
    }
}

/// builds the variable universe and all seven constraint families against
/// `solver`. eligibility restriction to the candidate pairs that get
/// variables at all is what realizes "only assign eligible people" -- no
/// separate constraint family is needed for it.
pub fn build_all(solver: &mut dyn Solver, ctx: &BuildContext) -> VarIndex {
    let index = build_variables(solver, ctx);
    constrain_past_assignments(solver, &index, ctx);
    constrain_one_person_per_slot(solver, &index, ctx);
    constrain_excluded_duties(solver, &index, ctx);
    constrain_fair_distribution(solver, &index, ctx);
    constrain_per_person_cap(solver, &index, ctx);
    constrain_month_boundary(solver, &index, ctx);
    constrain_locked(solver, &index, ctx);
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;

    fn duty(id: &str, excludes: &[&str]) -> Duty {
        Duty {
            id: id.into(),
            name: id.into(),
            service_id: "svc".into(),
            order: 0,
            excludes: excludes.iter().map(|s| DutyId::from(*s)).collect(),
            time_period: None,
        }
    }

    fn person(id: &str) -> Person {
        Person {
            id: id.into(),
            first_name: "F".into(),
            last_name: "L".into(),
            active: true,
        }
    }

    #[test]
    fn fair_distribution_splits_evenly_between_two_equal_eligibles() {
        use crate::model::Preference;
        use crate::solver::GoodLpSolver;

        let persons = vec![person("a"), person("b")];
        let prefs = vec![
            Preference { person_id: "a".into(), duty_id: "d".into(), value: 1.0 },
            Preference { person_id: "b".into(), duty_id: "d".into(), value: 1.0 },
        ];
        let eligibility = EligibilityIndex::build(&persons, &prefs);

        let slots: Vec<SlotKey> = (1..=4)
            .map(|day| SlotKey::new(NaiveDate::from_ymd_opt(2025, 3, day).unwrap(), "d".into()))
            .collect();

        let duties: HashMap<DutyId, Duty> = [(DutyId::from("d"), duty("d", &[]))].into_iter().collect();
        let duty_weekday: HashMap<DutyId, Option<u8>> = [(DutyId::from("d"), Some(0))].into_iter().collect();
        let layout = MonthLayout::new(2025, 3, &[]);
        let config = CoreConfig::default();
        let effective_cap = HashMap::new();
        let locked = HashMap::new();

        let ctx = BuildContext {
            year: 2025,
            month: 3,
            slots: &slots,
            duties: &duties,
            duty_weekday: &duty_weekday,
            eligibility: &eligibility,
            parent_assignments: &[],
            locked: &locked,
            layout: &layout,
            config: &config,
            effective_cap: &effective_cap,
        };

        let mut solver = GoodLpSolver::new();
        let index = build_variables(&mut solver, &ctx);
        constrain_one_person_per_slot(&mut solver, &index, &ctx);
        constrain_fair_distribution(&mut solver, &index, &ctx);

        // maximize nothing in particular; we only care that the model is
        // feasible and respects the per-person cap of ceil(4/2) = 2.
        let terms: Vec<(VarId, f64)> = index.values().map(|&v| (v, 1.0)).collect();
        solver.set_objective(true, &terms);

        let outcome = Box::new(solver).solve();
        assert!(matches!(outcome.status, crate::solver::SolveStatus::Optimal));

        for person in ["a", "b"] {
            let total: f64 = slots
                .iter()
                .filter_map(|slot| index.get(&(slot.clone(), PersonId::from(person))))
                .map(|v| outcome.values[v])
                .sum();
            assert!((total - 2.0).abs() < 1e-6, "{person} should get exactly 2 of 4 slots");
        }
    }
}
