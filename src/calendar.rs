//! materializes the ordered set of (date, duty) slots that must be filled
//! in a calendar month, given the services active that month.
//!
//! the week-indexing and weekly-service-day rules here must stay identical
//! to whatever renders the same calendar to an operator; this module is a
//! direct, unembellished port of that arithmetic.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

use crate::keys::SlotKey;
use crate::model::ServiceDuties;

/// a month laid out as Sunday-first weeks; `0` marks a day outside the
/// month.
type Week = [u32; 7];

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap();
    let this_first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    next_first.signed_duration_since(this_first).num_days() as u32
}

/// Sunday=0 .. Saturday=6, matching the weekday encoding used on `Service`.
fn sunday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn month_calendar(year: i32, month: u32) -> Vec<Week> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid year/month");
    let mut col = sunday_index(first) as usize;
    let mut weeks = Vec::new();
    let mut week: Week = [0; 7];

    for day in 1..=days_in_month(year, month) {
        week[col] = day;
        col += 1;
        if col == 7 {
            weeks.push(week);
            week = [0; 7];
            col = 0;
        }
    }
    if col != 0 {
        weeks.push(week);
    }
    weeks
}

fn has_services_this_week(week: &Week, service_days: &BTreeSet<Option<u8>>) -> bool {
    service_days
        .iter()
        .filter_map(|d| *d)
        .any(|d| week[d as usize] != 0)
}

/// the first non-empty day in `week` whose index is a known service day,
/// used to resolve a `weekday: None` (weekly) service to a concrete date.
fn first_service_day(week: &Week, service_days: &BTreeSet<Option<u8>>) -> Option<u32> {
    (0..7u8).find_map(|i| {
        if service_days.contains(&Some(i)) && week[i as usize] != 0 {
            Some(week[i as usize])
        } else {
            None
        }
    })
}

/// the active weeks for a month plus the service-day set needed to resolve
/// weekly (`weekday: None`) services, kept around so the constraint builder
/// can re-resolve a single service's date per week (e.g. to week-align two
/// duties for the exclusion constraint) without recomputing the calendar.
pub struct MonthLayout {
    year: i32,
    month: u32,
    active_weeks: Vec<Week>,
    service_days: BTreeSet<Option<u8>>,
}

impl MonthLayout {
    pub fn new(year: i32, month: u32, services: &[ServiceDuties]) -> Self {
        let service_days: BTreeSet<Option<u8>> =
            services.iter().map(|sd| sd.service.weekday).collect();
        let active_weeks: Vec<Week> = month_calendar(year, month)
            .into_iter()
            .filter(|week| has_services_this_week(week, &service_days))
            .collect();
        Self {
            year,
            month,
            active_weeks,
            service_days,
        }
    }

    /// one entry per active week, in calendar order; `None` where the
    /// service has no slot in that week (a weekday-bound service whose
    /// weekday does not occur in a partial first/last week).
    pub fn resolve(&self, weekday: Option<u8>) -> Vec<Option<NaiveDate>> {
        self.active_weeks
            .iter()
            .map(|week| {
                let day = match weekday {
                    Some(w) => {
                        let day = week[w as usize];
                        if day == 0 {
                            return None;
                        }
                        day
                    }
                    None => first_service_day(week, &self.service_days)?,
                };
                NaiveDate::from_ymd_opt(self.year, self.month, day)
            })
            .collect()
    }
}

/// produce the ordered, de-duplicated list of slots for `year`/`month`
/// given the services (with their owned duties) active that month.
pub fn expand(year: i32, month: u32, services: &[ServiceDuties]) -> Vec<SlotKey> {
    let layout = MonthLayout::new(year, month, services);

    let mut slots = Vec::new();
    for sd in services {
        for date in layout.resolve(sd.service.weekday).into_iter().flatten() {
            for duty in &sd.duties {
                slots.push(SlotKey::new(date, duty.id.clone()));
            }
        }
    }
    slots
}
