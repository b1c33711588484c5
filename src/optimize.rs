//! the objective and the driver that ties calendar, eligibility, stats,
//! constraints and solver together into one optimization run.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::calendar::{self, MonthLayout};
use crate::config::{CoreConfig, COLD_START_JITTER_RANGE, COLD_START_THRESHOLD};
use crate::constraints::{self, BuildContext};
use crate::eligibility::EligibilityIndex;
use crate::error::CoreError;
use crate::keys::SlotKey;
use crate::model::{Assignment, Duty, DutyId, PersonId, Preference, ServiceDuties};
use crate::solver::{GoodLpSolver, SolveStatus, Solver, BINARY_TRUE_THRESHOLD};
use crate::stats::StatsTriple;

/// everything the optimizer needs for one month, already loaded from the
/// repository by the caller.
pub struct ScheduleInput<'a> {
    pub year: i32,
    pub month: u32,
    pub services: &'a [ServiceDuties],
    pub active_persons: &'a [crate::model::Person],
    pub preferences: &'a [Preference],
    pub parent_assignments: &'a [Assignment],
    pub parent_stats: &'a HashMap<(PersonId, DutyId), StatsTriple>,
    pub locked: &'a HashMap<SlotKey, PersonId>,
    pub config: &'a CoreConfig,
}

/// `1 / (1 + avg_positive_delta)`, clamped to `[1, 5]` and rounded to the
/// nearest whole slot; only used when `config.delta_scaled_cap` is set.
fn delta_scaled_cap(stats: &HashMap<(PersonId, DutyId), StatsTriple>, person: &PersonId) -> u32 {
    let positive: Vec<f64> = stats
        .iter()
        .filter(|((p, _), _)| p == person)
        .map(|(_, t)| t.delta)
        .filter(|d| *d > 0.0)
        .collect();
    if positive.is_empty() {
        return 5;
    }
    let avg = positive.iter().sum::<f64>() / positive.len() as f64;
    let cap = (1.0 / (1.0 + avg)).round() as u32;
    cap.clamp(1, 5)
}

fn effective_caps(
    persons: &[crate::model::Person],
    config: &CoreConfig,
    parent_stats: &HashMap<(PersonId, DutyId), StatsTriple>,
) -> HashMap<PersonId, u32> {
    if !config.delta_scaled_cap {
        return HashMap::new();
    }
    persons
        .iter()
        .map(|p| (p.id.clone(), delta_scaled_cap(parent_stats, &p.id)))
        .collect()
}

/// looks up a stats triple, applying the "unknown person defaults to zero,
/// known person with a gap for this duty is an error" rule.
fn stats_for(
    stats: &HashMap<(PersonId, DutyId), StatsTriple>,
    person: &PersonId,
    duty: &DutyId,
) -> Result<StatsTriple, CoreError> {
    if let Some(triple) = stats.get(&(person.clone(), duty.clone())) {
        return Ok(*triple);
    }
    let has_any = stats.keys().any(|(p, _)| p == person);
    if has_any {
        Err(CoreError::MissingStats {
            person: person.to_string(),
            duty: duty.to_string(),
        })
    } else {
        Ok(StatsTriple::ZERO)
    }
}

/// applies the cold-start boost to a person/duty's actual average: when a
/// person is far below their ideal share, jitter their actual upward so
/// the optimizer doesn't overcorrect by dumping every open slot on them at
/// once. `k` is drawn once per (person, duty) and cached in `memo` for the
/// rest of the run, so a duty with several slots in the month doesn't
/// re-roll the jitter at every slot.
fn adjusted_actual(
    person: &PersonId,
    duty: &DutyId,
    actual: f64,
    ideal: f64,
    rng: &mut StdRng,
    memo: &mut HashMap<(PersonId, DutyId), f64>,
) -> f64 {
    if ideal > 0.0 && actual < COLD_START_THRESHOLD * ideal {
        let k = *memo
            .entry((person.clone(), duty.clone()))
            .or_insert_with(|| rng.random_range(COLD_START_JITTER_RANGE.0..=COLD_START_JITTER_RANGE.1));
        actual + (ideal - actual) * k
    } else {
        actual
    }
}

fn duty_weekday_map(services: &[ServiceDuties]) -> HashMap<DutyId, Option<u8>> {
    services
        .iter()
        .flat_map(|sd| sd.duties.iter().map(|d| (d.id.clone(), sd.service.weekday)))
        .collect()
}

fn duty_map(services: &[ServiceDuties]) -> HashMap<DutyId, Duty> {
    services
        .iter()
        .flat_map(|sd| sd.duties.iter().map(|d| (d.id.clone(), d.clone())))
        .collect()
}

/// solves one month's assignment problem and returns the decoded
/// `slot -> person` map, sorted by each slot's owning duty order then by
/// date.
pub fn generate_schedule(input: &ScheduleInput) -> Result<Vec<(SlotKey, PersonId)>, CoreError> {
    let slots = calendar::expand(input.year, input.month, input.services);
    let layout = MonthLayout::new(input.year, input.month, input.services);
    let eligibility = EligibilityIndex::build(input.active_persons, input.preferences);
    let duties = duty_map(input.services);
    let duty_weekday = duty_weekday_map(input.services);
    let effective_cap = effective_caps(input.active_persons, input.config, input.parent_stats);

    let preference_weights: HashMap<(PersonId, DutyId), f64> = input
        .preferences
        .iter()
        .map(|p| ((p.person_id.clone(), p.duty_id.clone()), p.value))
        .collect();

    let ctx = BuildContext {
        year: input.year,
        month: input.month,
        slots: &slots,
        duties: &duties,
        duty_weekday: &duty_weekday,
        eligibility: &eligibility,
        parent_assignments: input.parent_assignments,
        locked: input.locked,
        layout: &layout,
        config: input.config,
        effective_cap: &effective_cap,
    };

    let mut solver: Box<dyn Solver> = Box::new(GoodLpSolver::new());
    let index = constraints::build_all(solver.as_mut(), &ctx);

    let mut rng = match input.config.cold_start_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut cold_start_memo: HashMap<(PersonId, DutyId), f64> = HashMap::new();
    let mut objective_terms = Vec::new();
    for slot in &slots {
        for person in eligibility.eligible_for(&slot.duty) {
            let Some(&var) = index.get(&(slot.clone(), person.clone())) else {
                continue;
            };
            let triple = stats_for(input.parent_stats, &person, &slot.duty)?;
            let weight = preference_weights
                .get(&(person.clone(), slot.duty.clone()))
                .copied()
                .unwrap_or(0.0);
            let actual = adjusted_actual(
                &person,
                &slot.duty,
                triple.actual_avg,
                triple.ideal_avg,
                &mut rng,
                &mut cold_start_memo,
            );
            let coeff = triple.ideal_avg - actual * weight;
            objective_terms.push((var, coeff));
        }
    }
    solver.set_objective(true, &objective_terms);

    let outcome = solver.solve();
    match outcome.status {
        SolveStatus::Infeasible => return Err(CoreError::Infeasible),
        SolveStatus::Failure(code) => return Err(CoreError::SolverFailure { code }),
        SolveStatus::Optimal => {}
    }

    let mut decoded: Vec<(SlotKey, PersonId)> = Vec::new();
    for ((slot, person), var) in &index {
        let value = outcome.values.get(var).copied().unwrap_or(0.0);
        if value < BINARY_TRUE_THRESHOLD {
            continue;
        }
        // only current-month slots are part of the result; parent-version
        // and locked-override vars for out-of-month slots exist purely to
        // drive constraints.
        if slot.date.year() != input.year || slot.date.month() != input.month {
            continue;
        }
        if !eligibility.is_eligible(person, &slot.duty) && !input.locked.contains_key(slot) {
            warn!(%slot, %person, "rejecting decoded assignment: solver picked an ineligible person");
            continue;
        }
        decoded.push((slot.clone(), person.clone()));
    }

    decoded.sort_by(|(a, pa), (b, pb)| {
        let order_a = duties.get(&a.duty).map(|d| d.order).unwrap_or(i32::MAX);
        let order_b = duties.get(&b.duty).map(|d| d.order).unwrap_or(i32::MAX);
        order_a
            .cmp(&order_b)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| pa.cmp(pb))
    });

    Ok(decoded)
}

/// validates that every locked slot actually belongs to the expanded
/// month before building any constraints against it.
pub fn validate_locked(
    locked: &HashMap<SlotKey, PersonId>,
    year: i32,
    month: u32,
    services: &[ServiceDuties],
) -> Result<(), CoreError> {
    let expanded: std::collections::HashSet<SlotKey> =
        calendar::expand(year, month, services).into_iter().collect();
    for slot in locked.keys() {
        if !expanded.contains(slot) {
            return Err(CoreError::SlotNotInMonth { slot: slot.clone() });
        }
    }
    Ok(())
}
