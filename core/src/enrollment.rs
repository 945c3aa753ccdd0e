//! Enrollment decisions: who joins the plan, when, and at what rate.
//!
//! Two mutually exclusive paths per employee per year:
//!   - auto-enrollment plans: a voluntary election inside the window
//!     pre-empts the automatic event at the window boundary;
//!   - voluntary-only plans: a demographic-weighted draw.
//! Previously eligible non-participants get a small conversion chance
//! every year. The registry allows at most one enrollment-initiating
//! event per (employee, plan design, year).

use crate::{
    accumulator::{round_cents, EnrollmentStatus},
    clock,
    config::{AutoEnrollmentScope, EnrollmentModelConfig, PlanRules, ELECTED_RATE_CEILING, ELECTED_RATE_FLOOR},
    eligibility::{self, EmployeeSnapshot},
    event::{ChangeReason, EnrollmentMethod, Event, EventOrigin, EventPayload},
    rng::SubsystemRng,
    types::{EmployeeId, PlanDesignId, SimYear},
};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

pub const ENROLLMENT_SOURCE: &str = "enrollment";

/// Enrollment-initiating events already issued, keyed by
/// (employee, plan design, year). Derived from ledger contents.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentRegistry {
    initiated: BTreeSet<(EmployeeId, PlanDesignId, SimYear)>,
}

impl EnrollmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut registry = Self::new();
        for e in events {
            if e.event_type.is_enrollment_initiating() {
                registry.register(&e.employee_id, &e.plan_design_id, e.simulation_year);
            }
        }
        registry
    }

    pub fn contains(&self, employee_id: &str, plan_design_id: &str, year: SimYear) -> bool {
        self.initiated
            .contains(&(employee_id.to_string(), plan_design_id.to_string(), year))
    }

    /// Returns false when the key was already present.
    pub fn register(&mut self, employee_id: &str, plan_design_id: &str, year: SimYear) -> bool {
        self.initiated
            .insert((employee_id.to_string(), plan_design_id.to_string(), year))
    }

    pub fn len(&self) -> usize {
        self.initiated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initiated.is_empty()
    }
}

pub struct EnrollmentDecisionEngine<'a> {
    pub scenario_id:           &'a str,
    pub model:                 &'a EnrollmentModelConfig,
    pub first_simulation_year: SimYear,
}

impl<'a> EnrollmentDecisionEngine<'a> {
    pub fn new(scenario_id: &'a str, model: &'a EnrollmentModelConfig, first_simulation_year: SimYear) -> Self {
        Self { scenario_id, model, first_simulation_year }
    }

    fn origin<'r>(&'r self, rules: &'r PlanRules, year: SimYear) -> EventOrigin<'r> {
        EventOrigin {
            scenario_id:     self.scenario_id,
            plan_design_id:  &rules.plan_design_id,
            simulation_year: year,
            source:          ENROLLMENT_SOURCE,
        }
    }

    /// Decide this year's enrollment for one employee.
    ///
    /// `snapshot` should be taken at the end of `simulation_year` so that the
    /// whole year's service is visible; every check is made as of the
    /// candidate event date. Returns at most one `enrollment` event.
    pub fn decide(
        &self,
        snapshot: &EmployeeSnapshot,
        rules: &PlanRules,
        simulation_year: SimYear,
        registry: &mut EnrollmentRegistry,
        rng: &mut SubsystemRng,
    ) -> Option<Event> {
        if snapshot.enrollment_status == EnrollmentStatus::Enrolled {
            return None;
        }
        if registry.contains(&snapshot.employee_id, &rules.plan_design_id, simulation_year) {
            return None;
        }

        let year_start = clock::year_start(simulation_year);
        let year_end = clock::year_end(simulation_year);
        let service_start = snapshot.service_periods.last()?.start;

        let scan_from = service_start.max(clock::year_start(simulation_year - 1));
        let first = eligibility::first_entry_date(snapshot, rules, scan_from, year_end)?;
        let mut entry = first.entry_date?;

        let ae = &rules.auto_enrollment;
        let auto_in_scope = ae.enabled
            && snapshot.enrollment_status == EnrollmentStatus::NotEnrolled
            && match ae.scope {
                AutoEnrollmentScope::NewHiresOnly => service_start.year() >= self.first_simulation_year,
                AutoEnrollmentScope::AllEligible  => true,
            };
        if auto_in_scope
            && ae.scope == AutoEnrollmentScope::AllEligible
            && simulation_year == self.first_simulation_year
            && entry < year_start
        {
            entry = year_start;
        }

        let probability = self.participation_probability(snapshot);
        let window_end = clock::add_days(entry, i64::from(ae.window_days));

        let (date, method, rate) = if snapshot.enrollment_status == EnrollmentStatus::OptedOut {
            self.conversion(service_start, simulation_year, snapshot, rules, rng)?
        } else if auto_in_scope {
            if entry.year() == simulation_year {
                if rng.chance(probability * self.model.pre_auto_voluntary_share) {
                    let lag = rng.next_u64_below(u64::from(ae.window_days)) as i64;
                    let date = clock::add_days(entry, lag).min(year_end);
                    (date, EnrollmentMethod::Voluntary, self.draw_deferral_rate(snapshot, rules, rng))
                } else if window_end <= year_end {
                    (window_end, EnrollmentMethod::Auto, ae.default_rate)
                } else {
                    return None;
                }
            } else if entry.year() == simulation_year - 1 && window_end >= year_start {
                (window_end, EnrollmentMethod::Auto, ae.default_rate)
            } else {
                self.conversion(service_start, simulation_year, snapshot, rules, rng)?
            }
        } else if entry.year() == simulation_year {
            if !rng.chance(probability) {
                return None;
            }
            let lag = rng.next_u64_below(u64::from(self.model.voluntary_election_lag_days)) as i64;
            let date = clock::add_days(entry, lag).min(year_end);
            (date, EnrollmentMethod::Voluntary, self.draw_deferral_rate(snapshot, rules, rng))
        } else {
            self.conversion(service_start, simulation_year, snapshot, rules, rng)?
        };

        if date < year_start || date > year_end || !snapshot.employed_on(date) {
            return None;
        }
        if !registry.register(&snapshot.employee_id, &rules.plan_design_id, simulation_year) {
            return None;
        }

        Some(self.origin(rules, simulation_year).event(
            &snapshot.employee_id,
            0,
            date,
            EventPayload::Enrollment {
                method,
                deferral_rate: rate,
                prev_employee_deferral_rate: 0.0,
            },
        ))
    }

    /// Opt-out following an automatic enrollment.
    pub fn decide_opt_out(
        &self,
        enrollment: &Event,
        snapshot: &EmployeeSnapshot,
        rules: &PlanRules,
        rng: &mut SubsystemRng,
    ) -> Option<Event> {
        let EventPayload::Enrollment { method: EnrollmentMethod::Auto, deferral_rate, .. } = &enrollment.payload else {
            return None;
        };
        if !rng.chance(rules.auto_enrollment.opt_out_rate) {
            return None;
        }
        let year = enrollment.simulation_year;
        let lag = 1 + rng.next_u64_below(u64::from(self.model.opt_out_window_days.max(1))) as i64;
        let date = clock::add_days(enrollment.effective_date, lag).min(clock::year_end(year));
        if date <= enrollment.effective_date || !snapshot.employed_on(date) {
            return None;
        }
        Some(self.origin(rules, year).event(
            &snapshot.employee_id,
            1,
            date,
            EventPayload::EnrollmentChange {
                reason:        ChangeReason::OptOut,
                previous_rate: *deferral_rate,
                new_rate:      0.0,
            },
        ))
    }

    /// base × age-segment × income-segment multipliers, clamped to [0, 1].
    pub fn participation_probability(&self, snapshot: &EmployeeSnapshot) -> f64 {
        let age_mult = self
            .model
            .age_segment(snapshot.age)
            .map_or(1.0, |s| s.probability_multiplier);
        let income_mult = self
            .model
            .income_segment(snapshot.compensation)
            .map_or(1.0, |s| s.probability_multiplier);
        (self.model.base_probability * age_mult * income_mult).clamp(0.0, 1.0)
    }

    /// Demographic-weighted rate in [1%, 10%], biased toward the rate that
    /// captures the full employer match.
    pub fn draw_deferral_rate(&self, snapshot: &EmployeeSnapshot, rules: &PlanRules, rng: &mut SubsystemRng) -> f64 {
        let match_max = rules.employer_match.match_maximizing_rate();
        let drawn = match match_max {
            Some(rate) if rng.chance(self.model.match_bias) => rate,
            _ => {
                let weights: Vec<f64> = self.model.rate_options.iter().map(|o| o.weight).collect();
                let base = rng
                    .weighted_index(&weights)
                    .and_then(|i| self.model.rate_options.get(i))
                    .map_or(ELECTED_RATE_FLOOR, |o| o.rate);
                let shift = self.model.age_segment(snapshot.age).map_or(0.0, |s| s.rate_shift);
                base + shift
            }
        };
        let bounded = drawn.clamp(ELECTED_RATE_FLOOR, ELECTED_RATE_CEILING);
        (bounded * 10_000.0).round() / 10_000.0
    }

    fn conversion(
        &self,
        service_start: NaiveDate,
        year: SimYear,
        snapshot: &EmployeeSnapshot,
        rules: &PlanRules,
        rng: &mut SubsystemRng,
    ) -> Option<(NaiveDate, EnrollmentMethod, f64)> {
        if !rng.chance(self.model.voluntary_conversion_rate) {
            return None;
        }
        let from = service_start.max(clock::year_start(year));
        let span = (clock::year_end(year) - from).num_days().max(0) as u64 + 1;
        let date = clock::add_days(from, rng.next_u64_below(span) as i64);
        Some((date, EnrollmentMethod::Voluntary, self.draw_deferral_rate(snapshot, rules, rng)))
    }
}

/// Expected first-year contribution at `rate`, used in decision logging.
pub fn expected_contribution(snapshot: &EmployeeSnapshot, rate: f64) -> f64 {
    round_cents(snapshot.compensation * rate)
}
