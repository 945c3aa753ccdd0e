//! Deferral escalation generator: annual automatic increase for
//! participants below the plan's escalation cap.

use crate::{
    error::SimResult,
    event::{ChangeReason, Event, EventPayload},
    rng::{GeneratorSlot, RngBank},
    subsystem::{EventGenerator, Stage, YearContext},
};
use rayon::prelude::*;

pub struct DeferralEscalationSubsystem;

impl DeferralEscalationSubsystem {
    pub fn new() -> Self {
        Self
    }

    /// Escalated rate, rounded to basis points. None when nothing changes.
    pub fn escalate(current: f64, increment: f64, cap: f64) -> Option<f64> {
        if current <= 0.0 || current >= cap {
            return None;
        }
        let next = ((current + increment).min(cap) * 10_000.0).round() / 10_000.0;
        (next > current).then_some(next)
    }
}

impl Default for DeferralEscalationSubsystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGenerator for DeferralEscalationSubsystem {
    fn name(&self) -> &'static str {
        "escalation"
    }

    fn slot(&self) -> GeneratorSlot {
        GeneratorSlot::Escalation
    }

    fn stage(&self) -> Stage {
        Stage::Benefits
    }

    fn generate(&self, ctx: &YearContext<'_>, _events_in: &[Event], _rng: &RngBank) -> SimResult<Vec<Event>> {
        let escalation = &ctx.plan().deferral_escalation;
        if !escalation.enabled {
            return Ok(Vec::new());
        }
        let Some(date) = escalation.effective_date(ctx.year) else {
            return Ok(Vec::new());
        };
        let origin = ctx.origin(self.name());

        let candidates: Vec<_> = ctx
            .prior_state
            .values()
            .filter(|r| r.is_participating())
            .collect();
        let events: Vec<Event> = candidates
            .par_iter()
            .filter_map(|prior| {
                let new_rate = Self::escalate(prior.current_deferral_rate, escalation.increment, escalation.cap)?;
                // The provisional row carries this year's terminations and rehires.
                let current = ctx.provisional_state.get(&prior.employee_id)?;
                if !current.employed_on(date) || !current.is_participating() {
                    return None;
                }
                Some(origin.event(
                    &prior.employee_id,
                    0,
                    date,
                    EventPayload::EnrollmentChange {
                        reason:        ChangeReason::Escalation,
                        previous_rate: prior.current_deferral_rate,
                        new_rate,
                    },
                ))
            })
            .collect();
        log::debug!("year={} escalation: {} increases effective {date}", ctx.year, events.len());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_stops_at_the_cap() {
        assert_eq!(DeferralEscalationSubsystem::escalate(0.06, 0.01, 0.10), Some(0.07));
        assert_eq!(DeferralEscalationSubsystem::escalate(0.095, 0.01, 0.10), Some(0.10));
        assert_eq!(DeferralEscalationSubsystem::escalate(0.10, 0.01, 0.10), None);
        assert_eq!(DeferralEscalationSubsystem::escalate(0.0, 0.01, 0.10), None);
    }
}
