//! Hiring generator: replaces this year's leavers and grows the workforce
//! toward `target_growth_rate`.
//!
//! hires = (target headcount - survivors) / (1 - new_hire_termination_rate)
//!
//! A `rehire_share` of the hires comes back from former employees. New hires
//! may leave again before year end at `new_hire_termination_rate`.

use crate::{
    accumulator::{EmploymentStatus, StateRow},
    census::NONRESIDENT_ALIEN_SHARE,
    clock,
    config::WorkforceConfig,
    error::SimResult,
    event::{Event, EventPayload, HirePayload, TerminationReason},
    rng::{GeneratorSlot, RngBank, SubsystemRng},
    subsystem::{termination_dates, EventGenerator, Stage, YearContext},
    types::SimYear,
};
use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;

/// Former employees who left within this many years may be rehired.
pub const REHIRE_LOOKBACK_YEARS: i32 = 5;

pub struct HiringSubsystem;

impl HiringSubsystem {
    pub fn new() -> Self {
        Self
    }

    /// Number of hires needed this year.
    pub fn hire_count(workforce: &WorkforceConfig, active_at_start: usize, leavers: usize) -> usize {
        let target = (active_at_start as f64 * (1.0 + workforce.target_growth_rate)).round();
        let survivors = active_at_start.saturating_sub(leavers) as f64;
        let needed = (target - survivors).max(0.0);
        (needed / (1.0 - workforce.new_hire_termination_rate)).round() as usize
    }

    fn new_hire(&self, ctx: &YearContext<'_>, rng: &mut SubsystemRng) -> (NaiveDate, HirePayload) {
        let workforce = &ctx.config.workforce;
        let hire_date = random_day(ctx.year, rng);

        let weights: Vec<f64> = workforce.levels.iter().map(|l| l.hire_weight).collect();
        let level = rng
            .weighted_index(&weights)
            .and_then(|i| workforce.levels.get(i))
            .or_else(|| workforce.levels.first());
        let (job_level, annual_compensation) = match level {
            Some(l) => (l.level, rng.uniform(l.compensation_min, l.compensation_max).round()),
            None => (1, 50_000.0),
        };

        let age_span = u64::from(workforce.hire_age_max - workforce.hire_age_min);
        let age = workforce.hire_age_min + rng.next_u64_below(age_span) as u32;
        let birth_date = clock::add_days(hire_date, -(i64::from(age) * 365 + rng.next_u64_below(365) as i64));

        let weekly_hours = if rng.chance(workforce.part_time_share) {
            workforce.part_time_weekly_hours
        } else {
            workforce.full_time_weekly_hours
        };
        let payload = HirePayload {
            birth_date,
            job_level,
            annual_compensation,
            location: rng.pick(&workforce.locations).cloned().unwrap_or_default(),
            division: rng.pick(&workforce.divisions).cloned().unwrap_or_default(),
            union_code: None,
            nonresident_alien: rng.chance(NONRESIDENT_ALIEN_SHARE),
            weekly_hours,
            excluded_from_plan: false,
            is_rehire: false,
        };
        (hire_date, payload)
    }

    fn rehire(&self, ctx: &YearContext<'_>, row: &StateRow, rng: &mut SubsystemRng) -> (NaiveDate, HirePayload) {
        let floor = row.termination_date.map_or(ctx.year_start(), |t| t.max(ctx.year_start()));
        let span = (ctx.year_end() - floor).num_days().max(0) as u64 + 1;
        let hire_date = clock::add_days(floor, rng.next_u64_below(span) as i64);
        let payload = HirePayload {
            birth_date:          row.birth_date,
            job_level:           row.job_level,
            annual_compensation: row.annual_compensation,
            location:            row.location.clone(),
            division:            row.division.clone(),
            union_code:          row.union_code.clone(),
            nonresident_alien:   row.nonresident_alien,
            weekly_hours:        row.weekly_hours,
            excluded_from_plan:  row.excluded_from_plan,
            is_rehire:           true,
        };
        (hire_date, payload)
    }

    /// Hire event plus, sometimes, a same-year departure.
    fn hire_events(
        &self,
        ctx: &YearContext<'_>,
        employee_id: &str,
        hire_date: NaiveDate,
        payload: HirePayload,
        rng: &mut SubsystemRng,
    ) -> Vec<Event> {
        let origin = ctx.origin(self.name());
        let mut events = vec![origin.event(employee_id, 0, hire_date, EventPayload::Hire(payload))];

        if rng.chance(ctx.config.workforce.new_hire_termination_rate) {
            let remaining = (ctx.year_end() - hire_date).num_days();
            if remaining > 0 {
                let leave = clock::add_days(hire_date, 1 + rng.next_u64_below(remaining as u64) as i64);
                events.push(origin.event(
                    employee_id,
                    1,
                    leave,
                    EventPayload::Termination { reason: TerminationReason::Voluntary },
                ));
            }
        }
        events
    }
}

impl Default for HiringSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

fn random_day(year: SimYear, rng: &mut SubsystemRng) -> NaiveDate {
    let offset = rng.next_u64_below(clock::days_in_year(year) as u64) as i64;
    clock::add_days(clock::year_start(year), offset)
}

impl EventGenerator for HiringSubsystem {
    fn name(&self) -> &'static str {
        "hiring"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Hiring
    }

    fn stage(&self) -> Stage {
        Stage::Workforce
    }

    fn generate(&self, ctx: &YearContext<'_>, events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>> {
        let workforce = &ctx.config.workforce;
        let active = ctx.active_at_start().len();
        let leavers = termination_dates(events_in).len();
        let hires = Self::hire_count(workforce, active, leavers);

        // Former employees eligible to come back, in id order.
        let lookback = ctx.year - REHIRE_LOOKBACK_YEARS;
        let pool: Vec<&StateRow> = ctx
            .prior_state
            .values()
            .filter(|r| {
                r.employment_status == EmploymentStatus::Terminated
                    && r.termination_reason.is_some_and(|t| t != TerminationReason::Retirement)
                    && r.termination_date.is_some_and(|d| d.year() >= lookback)
            })
            .collect();

        let mut year_rng = rng.for_year(self.slot(), ctx.year);
        let rehire_target = ((hires as f64 * workforce.rehire_share).round() as usize).min(pool.len());
        let mut candidates = pool;
        for i in 0..rehire_target {
            let j = i + year_rng.next_u64_below((candidates.len() - i) as u64) as usize;
            candidates.swap(i, j);
        }
        let rehired = &candidates[..rehire_target];

        let mut events: Vec<Event> = rehired
            .par_iter()
            .flat_map_iter(|row| {
                let mut rng = rng.for_employee(self.slot(), ctx.year, &row.employee_id);
                let (date, payload) = self.rehire(ctx, row, &mut rng);
                self.hire_events(ctx, &row.employee_id, date, payload, &mut rng)
            })
            .collect();

        let new_ids: Vec<String> = (1..=hires - rehire_target)
            .map(|n| format!("NH_{}_{n:05}", ctx.year))
            .collect();
        let new_hires: Vec<Event> = new_ids
            .par_iter()
            .flat_map_iter(|id| {
                let mut rng = rng.for_employee(self.slot(), ctx.year, id);
                let (date, payload) = self.new_hire(ctx, &mut rng);
                self.hire_events(ctx, id, date, payload, &mut rng)
            })
            .collect();
        events.extend(new_hires);

        log::debug!(
            "year={} hiring: {} hires ({} rehires) against {} leavers, {} active at start",
            ctx.year,
            hires,
            rehire_target,
            leavers,
            active
        );
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[test]
    fn hire_count_replaces_leavers_and_grows() {
        let mut workforce = SimConfig::default_test().workforce;
        workforce.target_growth_rate = 0.10;
        workforce.new_hire_termination_rate = 0.0;
        assert_eq!(HiringSubsystem::hire_count(&workforce, 100, 15), 25);

        workforce.new_hire_termination_rate = 0.20;
        assert_eq!(HiringSubsystem::hire_count(&workforce, 100, 15), 31);
    }

    #[test]
    fn shrinking_workforce_hires_nobody() {
        let mut workforce = SimConfig::default_test().workforce;
        workforce.target_growth_rate = -0.5;
        assert_eq!(HiringSubsystem::hire_count(&workforce, 100, 10), 0);
    }
}
