//! Enrollment generator: runs the decision engine for every employee in
//! this year's workforce and follows auto enrollments with opt-out draws.

use crate::{
    accumulator::StateRow,
    enrollment::{expected_contribution, EnrollmentDecisionEngine, EnrollmentRegistry},
    error::SimResult,
    event::{Event, EventPayload},
    rng::{GeneratorSlot, RngBank},
    subsystem::{events_by_employee, EventGenerator, Stage, YearContext},
};
use rayon::prelude::*;

pub struct EnrollmentSubsystem;

impl EnrollmentSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EnrollmentSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for EnrollmentSubsystem {
    fn name(&self) -> &'static str {
        "enrollment"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Enrollment
    }

    fn stage(&self) -> Stage {
        Stage::Benefits
    }

    fn generate(&self, ctx: &YearContext<'_>, events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>> {
        let plan = ctx.plan();
        let engine = EnrollmentDecisionEngine::new(
            ctx.config.scenario_id(),
            &ctx.config.enrollment_model,
            ctx.config.scenario.start_year,
        );
        let year_end = ctx.year_end();
        let prior_events = events_by_employee(events_in);

        let rows: Vec<&StateRow> = ctx
            .provisional_state
            .values()
            .filter(|r| r.days_employed_in(ctx.year) > 0)
            .collect();

        let events: Vec<Event> = rows
            .par_iter()
            .flat_map_iter(|row| {
                let mut registry = EnrollmentRegistry::from_events(
                    prior_events.get(&row.employee_id).into_iter().flatten().copied(),
                );
                let mut rng = rng.for_employee(self.slot(), ctx.year, &row.employee_id);
                let snapshot = row.employee_snapshot(year_end);

                let mut out = Vec::new();
                if let Some(enrollment) = engine.decide(&snapshot, plan, ctx.year, &mut registry, &mut rng) {
                    if let EventPayload::Enrollment { method, deferral_rate, .. } = &enrollment.payload {
                        log::trace!(
                            "year={} enrollment: {} {:?} at {:.2}% (~${:.2}/yr)",
                            ctx.year,
                            row.employee_id,
                            method,
                            deferral_rate * 100.0,
                            expected_contribution(&snapshot, *deferral_rate)
                        );
                    }
                    let opt_out = engine.decide_opt_out(&enrollment, &snapshot, plan, &mut rng);
                    out.push(enrollment);
                    out.extend(opt_out);
                }
                out
            })
            .collect();

        log::debug!(
            "year={} enrollment: {} events across {} employees",
            ctx.year,
            events.len(),
            rows.len()
        );
        Ok(events)
    }
}
