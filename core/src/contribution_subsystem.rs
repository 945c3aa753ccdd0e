//! Contribution generator: one year-end contribution fact per participant,
//! computed from the provisional fold of every earlier stage.
//!
//! The fold recomputes the same amounts from state; the event is the
//! ledger's record of what the year produced.

use crate::{
    accumulator::StateRow,
    clock,
    error::SimResult,
    event::{Event, EventPayload},
    rng::{GeneratorSlot, RngBank},
    subsystem::{EventGenerator, Stage, YearContext},
};
use rayon::prelude::*;

pub struct ContributionSubsystem;

impl ContributionSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn contribution(&self, ctx: &YearContext<'_>, row: &StateRow) -> Option<Event> {
        if row.days_employed_in(ctx.year) == 0 {
            return None;
        }
        if row.contribution_amount <= 0.0 && row.employer_match_amount <= 0.0 {
            return None;
        }
        // Last day worked in the year.
        let date = match row.termination_date {
            Some(t) if row.terminated_in(ctx.year) => clock::add_days(t, -1).max(ctx.year_start()),
            _ => ctx.year_end(),
        };
        Some(ctx.origin(self.name()).event(
            &row.employee_id,
            0,
            date,
            EventPayload::Contribution {
                employee_amount:       row.contribution_amount,
                employer_match_amount: row.employer_match_amount,
                deferral_rate:         row.current_deferral_rate,
                prorated_compensation: row.prorated_compensation,
                duration_category:     row.contribution_duration_category,
            },
        ))
    }
}

impl Default for ContributionSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for ContributionSubsystem {
    fn name(&self) -> &'static str {
        "contribution"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Contribution
    }

    fn stage(&self) -> Stage {
        Stage::Contributions
    }

    fn generate(&self, ctx: &YearContext<'_>, _events_in: &[Event], _rng: &RngBank) -> SimResult<Vec<Event>> {
        let rows: Vec<&StateRow> = ctx.provisional_state.values().collect();
        let events: Vec<Event> = rows
            .par_iter()
            .filter_map(|row| self.contribution(ctx, row))
            .collect();

        let total: f64 = events
            .iter()
            .map(|e| match e.payload {
                EventPayload::Contribution { employee_amount, .. } => employee_amount,
                _ => 0.0,
            })
            .sum();
        log::debug!(
            "year={} contribution: {} participants, ${:.2} deferred",
            ctx.year,
            events.len(),
            total
        );
        Ok(events)
    }
}
