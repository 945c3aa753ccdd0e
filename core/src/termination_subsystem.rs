//! Termination generator: attrition and retirement of the prior year-end
//! workforce.
//!
//! Retirement comes first: anyone reaching `retirement_age` during the year
//! leaves on that birthday. Everyone else faces their level's termination
//! rate (scaled by the scenario multiplier) on a uniformly drawn day.

use crate::{
    accumulator::StateRow,
    clock,
    error::SimResult,
    event::{Event, EventPayload, TerminationReason},
    rng::{GeneratorSlot, RngBank, SubsystemRng},
    subsystem::{EventGenerator, Stage, YearContext},
};
use rayon::prelude::*;

/// Share of non-retirement leavers who leave voluntarily.
pub const VOLUNTARY_SHARE: f64 = 0.70;

pub struct TerminationSubsystem;

impl TerminationSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn decide(&self, ctx: &YearContext<'_>, row: &StateRow, rng: &mut SubsystemRng) -> Option<Event> {
        let workforce = &ctx.config.workforce;
        let (year_start, year_end) = (ctx.year_start(), ctx.year_end());
        let origin = ctx.origin(self.name());

        let retirement = clock::anniversary(row.birth_date, workforce.retirement_age).max(year_start);
        if retirement <= year_end {
            return Some(origin.event(
                &row.employee_id,
                0,
                retirement,
                EventPayload::Termination { reason: TerminationReason::Retirement },
            ));
        }

        let base = workforce.level(row.job_level).map_or(0.0, |l| l.termination_rate);
        let rate = (base * workforce.termination_rate_multiplier).clamp(0.0, 1.0);
        if !rng.chance(rate) {
            return None;
        }
        let offset = rng.next_u64_below(clock::days_in_year(ctx.year) as u64) as i64;
        let reason = if rng.chance(VOLUNTARY_SHARE) {
            TerminationReason::Voluntary
        } else {
            TerminationReason::Involuntary
        };
        Some(origin.event(
            &row.employee_id,
            0,
            clock::add_days(year_start, offset),
            EventPayload::Termination { reason },
        ))
    }
}

impl Default for TerminationSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for TerminationSubsystem {
    fn name(&self) -> &'static str {
        "termination"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Termination
    }

    fn stage(&self) -> Stage {
        Stage::Attrition
    }

    fn generate(&self, ctx: &YearContext<'_>, _events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>> {
        let events: Vec<Event> = ctx
            .active_at_start()
            .par_iter()
            .filter_map(|row| {
                let mut rng = rng.for_employee(self.slot(), ctx.year, &row.employee_id);
                self.decide(ctx, row, &mut rng)
            })
            .collect();

        let retirements = events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Termination { reason: TerminationReason::Retirement }))
            .count();
        log::debug!(
            "year={} termination: {} leavers ({} retirements)",
            ctx.year,
            events.len(),
            retirements
        );
        Ok(events)
    }
}
