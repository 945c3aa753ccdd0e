//! Year snapshots: the per-year workforce and plan summary.
//!
//! A snapshot is written in the same transaction as the year's events,
//! after the accumulators are rebuilt. It is a reporting view only;
//! nothing is ever derived from it.

use crate::{
    accumulator::{round_cents, ContributionDurationCategory, EnrollmentStatus, FoldReport, StateTable},
    clock,
    config::PlanRules,
    eligibility,
    event::{ChangeReason, EnrollmentMethod, Event, EventPayload, TerminationReason},
    types::{ScenarioId, SimYear},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct YearSnapshot {
    pub scenario_id:      ScenarioId,
    pub simulation_year:  SimYear,

    // Workforce
    pub active_headcount: usize,
    /// Active at year end and eligible for the plan on that day.
    pub eligible_headcount: usize,
    pub hires:            usize,
    pub rehires:          usize,
    pub terminations:     usize,
    pub retirements:      usize,
    pub promotions:       usize,
    pub full_year:        usize,
    pub partial_year:     usize,

    // Plan
    pub participants:          usize,
    /// Enrolled share of `eligible_headcount`.
    pub participation_rate:    f64,
    pub auto_enrollments:      usize,
    pub voluntary_enrollments: usize,
    pub opt_outs:              usize,
    pub escalations:           usize,
    pub average_deferral_rate: f64,

    // Dollars
    pub total_prorated_compensation:  f64,
    pub total_employee_contributions: f64,
    pub total_employer_match:         f64,

    pub event_count:           usize,
    pub consistency_conflicts: usize,
}

impl YearSnapshot {
    /// Summarize a committed year from its folded state and its events.
    pub fn summarize(
        scenario_id: &str,
        year: SimYear,
        state: &StateTable,
        events: &[Event],
        report: &FoldReport,
        plan: &PlanRules,
    ) -> Self {
        let mut s = Self {
            scenario_id: scenario_id.to_string(),
            simulation_year: year,
            event_count: events.len(),
            consistency_conflicts: report.conflicts.len(),
            ..Self::default()
        };

        for e in events.iter().filter(|e| e.simulation_year == year) {
            match &e.payload {
                EventPayload::Hire(h) if h.is_rehire => s.rehires += 1,
                EventPayload::Hire(_) => s.hires += 1,
                EventPayload::Termination { reason: TerminationReason::Retirement } => {
                    s.terminations += 1;
                    s.retirements += 1;
                }
                EventPayload::Termination { reason: TerminationReason::CensusHistory } => {}
                EventPayload::Termination { .. } => s.terminations += 1,
                EventPayload::Promotion { .. } => s.promotions += 1,
                EventPayload::Enrollment { method: EnrollmentMethod::Auto, .. } => s.auto_enrollments += 1,
                EventPayload::Enrollment { method: EnrollmentMethod::Voluntary, .. } => {
                    s.voluntary_enrollments += 1
                }
                EventPayload::EnrollmentChange { reason: ChangeReason::OptOut, .. } => s.opt_outs += 1,
                EventPayload::EnrollmentChange { reason: ChangeReason::Escalation, .. } => {
                    s.escalations += 1
                }
                _ => {}
            }
        }

        let year_end = clock::year_end(year);
        let mut rate_sum = 0.0;
        let mut eligible_participants = 0usize;
        for row in state.values().filter(|r| r.in_workforce(year)) {
            match row.contribution_duration_category {
                ContributionDurationCategory::FullYear    => s.full_year += 1,
                ContributionDurationCategory::PartialYear => s.partial_year += 1,
                ContributionDurationCategory::Inactive    => {}
            }
            s.total_prorated_compensation += row.prorated_compensation;
            s.total_employee_contributions += row.contribution_amount;
            s.total_employer_match += row.employer_match_amount;

            if row.employed_on(year_end) {
                s.active_headcount += 1;
                let enrolled = row.enrollment_status == EnrollmentStatus::Enrolled;
                if enrolled {
                    s.participants += 1;
                    rate_sum += row.current_deferral_rate;
                }
                if eligibility::evaluate(&row.employee_snapshot(year_end), plan, year_end).is_eligible() {
                    s.eligible_headcount += 1;
                    if enrolled {
                        eligible_participants += 1;
                    }
                }
            }
        }

        if s.eligible_headcount > 0 {
            s.participation_rate = eligible_participants as f64 / s.eligible_headcount as f64;
        }
        if s.participants > 0 {
            s.average_deferral_rate = rate_sum / s.participants as f64;
        }
        s.total_prorated_compensation = round_cents(s.total_prorated_compensation);
        s.total_employee_contributions = round_cents(s.total_employee_contributions);
        s.total_employer_match = round_cents(s.total_employer_match);
        s
    }
}
