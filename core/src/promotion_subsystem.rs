//! Promotion generator: one-level moves up the job ladder.

use crate::{
    accumulator::StateRow,
    clock,
    error::SimResult,
    event::{Event, EventPayload},
    rng::{GeneratorSlot, RngBank, SubsystemRng},
    subsystem::{still_employed_on, termination_dates, EventGenerator, Stage, YearContext},
};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub struct PromotionSubsystem;

impl PromotionSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn decide(
        &self,
        ctx: &YearContext<'_>,
        row: &StateRow,
        terminations: &BTreeMap<&str, NaiveDate>,
        rng: &mut SubsystemRng,
    ) -> Option<Event> {
        let workforce = &ctx.config.workforce;
        let to_level = row.job_level.checked_add(1)?;
        workforce.level(to_level)?;

        let base = workforce.level(row.job_level).map_or(0.0, |l| l.promotion_rate);
        let rate = (base * workforce.promotion_rate_multiplier).clamp(0.0, 1.0);
        if !rng.chance(rate) {
            return None;
        }
        let offset = rng.next_u64_below(clock::days_in_year(ctx.year) as u64) as i64;
        let date = clock::add_days(ctx.year_start(), offset);
        if !still_employed_on(row, terminations, date) {
            return None;
        }
        Some(ctx.origin(self.name()).event(
            &row.employee_id,
            0,
            date,
            EventPayload::Promotion {
                from_level:   row.job_level,
                to_level,
                increase_pct: workforce.promotion_increase_pct,
            },
        ))
    }
}

impl Default for PromotionSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for PromotionSubsystem {
    fn name(&self) -> &'static str {
        "promotion"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Promotion
    }

    fn stage(&self) -> Stage {
        Stage::Workforce
    }

    fn generate(&self, ctx: &YearContext<'_>, events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>> {
        let terminations = termination_dates(events_in);
        let events: Vec<Event> = ctx
            .active_at_start()
            .par_iter()
            .filter_map(|row| {
                let mut rng = rng.for_employee(self.slot(), ctx.year, &row.employee_id);
                self.decide(ctx, row, &terminations, &mut rng)
            })
            .collect();
        log::debug!("year={} promotion: {} promotions", ctx.year, events.len());
        Ok(events)
    }
}
