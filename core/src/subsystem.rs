//! Event generator trait and the per-year context handed to generators.
//!
//! RULE: Every generator implements EventGenerator.
//! Generators read the committed prior-year state plus the events of
//! earlier stages, and return new events. They never touch the store.
//! Generators in the same stage run in parallel; stage order is fixed
//! and documented in engine.rs.

use crate::{
    accumulator::{StateRow, StateTable},
    clock,
    config::{PlanRules, ScenarioConfig},
    error::SimResult,
    event::{Event, EventOrigin, EventPayload},
    rng::{GeneratorSlot, RngBank},
    types::{EmployeeId, SimYear},
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Barriers between groups of generators. Each stage sees every event of
/// the stages before it, and the provisional fold of those events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Terminations and retirements of the prior year-end workforce.
    Attrition,
    /// Hiring, promotions and merit increases.
    Workforce,
    /// Enrollment, opt-out and deferral escalation.
    Benefits,
    /// Year-end contribution facts.
    Contributions,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Self::Attrition, Self::Workforce, Self::Benefits, Self::Contributions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attrition     => "attrition",
            Self::Workforce     => "workforce",
            Self::Benefits      => "benefits",
            Self::Contributions => "contributions",
        }
    }
}

/// Everything a generator may read for one simulated year.
pub struct YearContext<'a> {
    pub config:            &'a ScenarioConfig,
    pub year:              SimYear,
    /// Committed state at the end of the prior year.
    pub prior_state:       &'a StateTable,
    /// `prior_state` folded with the events of earlier stages.
    pub provisional_state: &'a StateTable,
}

impl<'a> YearContext<'a> {
    pub fn plan(&self) -> &'a PlanRules {
        &self.config.plan
    }

    pub fn origin(&self, source: &'static str) -> EventOrigin<'a> {
        EventOrigin {
            scenario_id:     self.config.scenario_id(),
            plan_design_id:  self.config.plan_design_id(),
            simulation_year: self.year,
            source,
        }
    }

    pub fn year_start(&self) -> NaiveDate {
        clock::year_start(self.year)
    }

    pub fn year_end(&self) -> NaiveDate {
        clock::year_end(self.year)
    }

    /// Rows employed on January 1st of the year.
    pub fn active_at_start(&self) -> Vec<&'a StateRow> {
        let jan1 = self.year_start();
        self.prior_state.values().filter(|r| r.employed_on(jan1)).collect()
    }
}

/// The contract every generator must fulfill.
pub trait EventGenerator: Send + Sync {
    /// Unique stable name, also the event-id source tag.
    fn name(&self) -> &'static str;

    /// RNG stream slot. Never shared between generators.
    fn slot(&self) -> GeneratorSlot;

    fn stage(&self) -> Stage;

    /// Produce this generator's events for `ctx.year`.
    ///
    /// - `events_in`: events emitted by earlier stages this year
    /// - `rng`:       the scenario's bank; draw per (slot, year, employee)
    fn generate(&self, ctx: &YearContext<'_>, events_in: &[Event], rng: &RngBank) -> SimResult<Vec<Event>>;
}

/// Termination dates this year, from earlier stages' events.
pub fn termination_dates(events: &[Event]) -> BTreeMap<&str, NaiveDate> {
    let mut out = BTreeMap::new();
    for e in events {
        if let EventPayload::Termination { .. } = e.payload {
            out.entry(e.employee_id.as_str())
                .and_modify(|d: &mut NaiveDate| *d = (*d).min(e.effective_date))
                .or_insert(e.effective_date);
        }
    }
    out
}

/// Employed on `date` given the prior state and this year's terminations.
pub fn still_employed_on(row: &StateRow, terminations: &BTreeMap<&str, NaiveDate>, date: NaiveDate) -> bool {
    row.employed_on(date) && terminations.get(row.employee_id.as_str()).map_or(true, |t| date < *t)
}

/// Group events by employee, keeping their order.
pub fn events_by_employee(events: &[Event]) -> BTreeMap<EmployeeId, Vec<&Event>> {
    let mut out: BTreeMap<EmployeeId, Vec<&Event>> = BTreeMap::new();
    for e in events {
        out.entry(e.employee_id.clone()).or_default().push(e);
    }
    out
}
