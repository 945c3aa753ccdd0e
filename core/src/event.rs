//! The event model: every employee lifecycle change is one immutable Event.
//!
//! RULE: Generators communicate ONLY through events.
//! Accumulated state is never edited directly; it is re-derived by folding
//! events out of the ledger. Corrections are new compensating events.

use crate::{
    accumulator::ContributionDurationCategory,
    clock,
    error::{SimError, SimResult},
    types::{EmployeeId, EventId, PlanDesignId, ScenarioId, SimYear},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Highest deferral rate the ledger accepts.
pub const MAX_DEFERRAL_RATE: f64 = 0.75;

/// Namespace for deterministic event ids. Never change it: ids of
/// regenerated years must match the ids already in the ledger.
const EVENT_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f1c_2a8e_93d4_4b7a_a0e5_5c1d_7e2f_9b30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Hire,
    Termination,
    Promotion,
    Merit,
    Enrollment,
    EnrollmentChange,
    Contribution,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        Self::Hire,
        Self::Termination,
        Self::Promotion,
        Self::Merit,
        Self::Enrollment,
        Self::EnrollmentChange,
        Self::Contribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hire             => "hire",
            Self::Termination      => "termination",
            Self::Promotion        => "promotion",
            Self::Merit            => "merit",
            Self::Enrollment       => "enrollment",
            Self::EnrollmentChange => "enrollment_change",
            Self::Contribution     => "contribution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Same-day resolution rank. Events on the same effective date are
    /// applied in ascending rank, so the highest rank has the last word:
    /// termination > enrollment_change > enrollment > promotion > merit > hire.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Contribution     => 0,
            Self::Hire             => 1,
            Self::Merit            => 2,
            Self::Promotion        => 3,
            Self::Enrollment       => 4,
            Self::EnrollmentChange => 5,
            Self::Termination      => 6,
        }
    }

    /// At most one of these per (employee, plan design, year).
    pub fn is_enrollment_initiating(&self) -> bool {
        matches!(self, Self::Enrollment)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Voluntary,
    Involuntary,
    Retirement,
    /// Prior service period recorded from the census.
    CensusHistory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentMethod {
    Voluntary,
    Auto,
    /// Participant already enrolled when the census was taken.
    Census,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    OptOut,
    Escalation,
    Election,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HirePayload {
    pub birth_date:          NaiveDate,
    pub job_level:           u8,
    pub annual_compensation: f64,
    pub location:            String,
    pub division:            String,
    #[serde(default)]
    pub union_code:          Option<String>,
    #[serde(default)]
    pub nonresident_alien:   bool,
    pub weekly_hours:        f64,
    #[serde(default)]
    pub excluded_from_plan:  bool,
    #[serde(default)]
    pub is_rehire:           bool,
}

/// Type-specific event fields. The tag doubles as the event type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Hire(HirePayload),
    Termination {
        reason: TerminationReason,
    },
    Promotion {
        from_level:   u8,
        to_level:     u8,
        increase_pct: f64,
    },
    Merit {
        increase_pct: f64,
    },
    Enrollment {
        method:                      EnrollmentMethod,
        deferral_rate:               f64,
        prev_employee_deferral_rate: f64,
    },
    EnrollmentChange {
        reason:        ChangeReason,
        previous_rate: f64,
        new_rate:      f64,
    },
    Contribution {
        employee_amount:       f64,
        employer_match_amount: f64,
        deferral_rate:         f64,
        prorated_compensation: f64,
        duration_category:     ContributionDurationCategory,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Hire(_)                 => EventType::Hire,
            Self::Termination { .. }      => EventType::Termination,
            Self::Promotion { .. }        => EventType::Promotion,
            Self::Merit { .. }            => EventType::Merit,
            Self::Enrollment { .. }       => EventType::Enrollment,
            Self::EnrollmentChange { .. } => EventType::EnrollmentChange,
            Self::Contribution { .. }     => EventType::Contribution,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id:        EventId,
    pub employee_id:     EmployeeId,
    pub scenario_id:     ScenarioId,
    pub plan_design_id:  PlanDesignId,
    pub event_type:      EventType,
    pub effective_date:  NaiveDate,
    pub simulation_year: SimYear,
    pub payload:         EventPayload,
    /// Stamped by the ledger on append. Not part of the canonical record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at:     Option<DateTime<Utc>>,
}

impl Event {
    /// Total order used by the fold and the ledger:
    /// (simulation_year, effective_date, type priority, event_id).
    pub fn ordering(&self, other: &Self) -> Ordering {
        self.simulation_year
            .cmp(&other.simulation_year)
            .then(self.effective_date.cmp(&other.effective_date))
            .then(self.event_type.priority().cmp(&other.event_type.priority()))
            .then_with(|| self.event_id.cmp(&other.event_id))
    }

    /// Canonical JSON of the payload, as persisted in the ledger.
    pub fn payload_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(&self.payload)?)
    }

    /// Schema and range checks. An event that fails is never appended.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |reason: String| Err(SimError::validation(self.event_id.clone(), reason));

        if self.event_id.is_empty() || self.employee_id.is_empty() || self.scenario_id.is_empty() {
            return fail("event_id, employee_id and scenario_id are required".into());
        }
        if self.event_type != self.payload.event_type() {
            return fail(format!(
                "event_type {} does not match payload {}",
                self.event_type.as_str(),
                self.payload.event_type().as_str()
            ));
        }
        if self.effective_date > clock::year_end(self.simulation_year) {
            return fail(format!(
                "effective_date {} is after simulation year {}",
                self.effective_date, self.simulation_year
            ));
        }

        let rate_ok = |r: f64| r.is_finite() && (0.0..=MAX_DEFERRAL_RATE).contains(&r);
        let amount_ok = |a: f64| a.is_finite() && a >= 0.0;

        match &self.payload {
            EventPayload::Hire(h) => {
                if !(h.annual_compensation.is_finite() && h.annual_compensation > 0.0) {
                    return fail(format!("compensation {} must be positive", h.annual_compensation));
                }
                if h.birth_date >= self.effective_date {
                    return fail("birth_date must precede hire date".into());
                }
                if !(h.weekly_hours.is_finite() && h.weekly_hours > 0.0 && h.weekly_hours <= 80.0) {
                    return fail(format!("weekly_hours {} out of range", h.weekly_hours));
                }
            }
            EventPayload::Termination { .. } => {}
            EventPayload::Promotion { from_level, to_level, increase_pct } => {
                if to_level <= from_level {
                    return fail(format!("promotion {from_level} -> {to_level} is not upward"));
                }
                if !(increase_pct.is_finite() && *increase_pct >= 0.0 && *increase_pct <= 1.0) {
                    return fail(format!("promotion increase {increase_pct} out of range"));
                }
            }
            EventPayload::Merit { increase_pct } => {
                if !(increase_pct.is_finite() && *increase_pct > -0.5 && *increase_pct <= 1.0) {
                    return fail(format!("merit increase {increase_pct} out of range"));
                }
            }
            EventPayload::Enrollment { deferral_rate, prev_employee_deferral_rate, .. } => {
                if !rate_ok(*deferral_rate) || !rate_ok(*prev_employee_deferral_rate) {
                    return fail(format!("deferral rate {deferral_rate} outside [0, {MAX_DEFERRAL_RATE}]"));
                }
            }
            EventPayload::EnrollmentChange { previous_rate, new_rate, .. } => {
                if !rate_ok(*previous_rate) || !rate_ok(*new_rate) {
                    return fail(format!("deferral rate {new_rate} outside [0, {MAX_DEFERRAL_RATE}]"));
                }
            }
            EventPayload::Contribution {
                employee_amount,
                employer_match_amount,
                deferral_rate,
                prorated_compensation,
                ..
            } => {
                if !rate_ok(*deferral_rate)
                    || !amount_ok(*employee_amount)
                    || !amount_ok(*employer_match_amount)
                    || !amount_ok(*prorated_compensation)
                {
                    return fail("contribution amounts must be non-negative and finite".into());
                }
            }
        }
        Ok(())
    }
}

/// Where events come from: one scenario, one plan design, one year, one generator.
/// Mints events with deterministic ids.
#[derive(Debug, Clone)]
pub struct EventOrigin<'a> {
    pub scenario_id:     &'a str,
    pub plan_design_id:  &'a str,
    pub simulation_year: SimYear,
    pub source:          &'static str,
}

impl EventOrigin<'_> {
    /// `seq` distinguishes several events for the same employee from the
    /// same generator in the same year.
    pub fn event(
        &self,
        employee_id: &str,
        seq: u32,
        effective_date: NaiveDate,
        payload: EventPayload,
    ) -> Event {
        let name = format!(
            "{}|{}|{}|{}|{}",
            self.scenario_id, self.simulation_year, self.source, employee_id, seq
        );
        Event {
            event_id:        uuid::Uuid::new_v5(&EVENT_NAMESPACE, name.as_bytes()).to_string(),
            employee_id:     employee_id.to_string(),
            scenario_id:     self.scenario_id.to_string(),
            plan_design_id:  self.plan_design_id.to_string(),
            event_type:      payload.event_type(),
            effective_date,
            simulation_year: self.simulation_year,
            payload,
            recorded_at:     None,
        }
    }
}

/// Sort a batch into fold order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(Event::ordering);
}
