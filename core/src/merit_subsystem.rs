//! Merit generator: the annual pay increase (merit plus cost-of-living),
//! effective on the configured month/day for everyone employed that day.

use crate::{
    error::{SimError, SimResult},
    event::{Event, EventPayload},
    rng::{GeneratorSlot, RngBank},
    subsystem::{still_employed_on, termination_dates, EventGenerator, Stage, YearContext},
};
use rayon::prelude::*;

/// Individual merit awards spread ± this fraction around the merit budget.
pub const MERIT_SPREAD: f64 = 0.5;

pub struct MeritSubsystem;

impl MeritSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MeritSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for MeritSubsystem {
    fn name(&self) -> &'static str {
        "merit"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Merit
    }

    fn stage(&self) -> Stage {
        Stage::Workforce
    }

    fn generate(&self, ctx: &YearContext<'_>, events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>> {
        let workforce = &ctx.config.workforce;
        let date = workforce
            .merit_effective_date(ctx.year)
            .ok_or_else(|| SimError::config(format!("merit date is not a calendar day in {}", ctx.year)))?;
        let terminations = termination_dates(events_in);
        let origin = ctx.origin(self.name());

        let events: Vec<Event> = ctx
            .active_at_start()
            .par_iter()
            .filter(|row| still_employed_on(row, &terminations, date))
            .map(|row| {
                let mut rng = rng.for_employee(self.slot(), ctx.year, &row.employee_id);
                let spread = rng.uniform(1.0 - MERIT_SPREAD, 1.0 + MERIT_SPREAD);
                let raw = workforce.merit_rate * spread + workforce.cola_rate;
                let increase_pct = (raw * 10_000.0).round() / 10_000.0;
                origin.event(&row.employee_id, 0, date, EventPayload::Merit { increase_pct })
            })
            .collect();
        log::debug!("year={} merit: {} increases effective {date}", ctx.year, events.len());
        Ok(events)
    }
}
