//! State accumulators: per-employee state derived by folding the ledger.
//!
//! RULES:
//!   - State is only ever produced by folding events. Nothing patches a row.
//!   - Events apply in (simulation_year, effective_date, type priority, event_id)
//!     order. Same-day conflicts resolve by priority: the higher rank applies
//!     last, so termination has the final word.
//!   - A full rebuild is the per-year fold applied year after year, so
//!     rebuild(Y) == fold_year(rebuild(Y - 1), events(Y)) by construction.
//!   - Every dollar amount for a year is derived from prorated compensation.
//!     A row terminated in the year is always `partial_year`.
//!   - Only ordered maps. No wall clock.

use crate::{
    clock,
    config::PlanRules,
    error::{SimError, SimResult},
    event::{ChangeReason, EnrollmentMethod, Event, EventPayload, EventType, TerminationReason},
    types::{EmployeeId, EventId, PlanDesignId, ScenarioId, SimYear},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    Terminated,
    /// Employed, but in a class the plan never covers.
    Excluded,
}

impl EmploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active     => "active",
            Self::Terminated => "terminated",
            Self::Excluded   => "excluded",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    NotEnrolled,
    Enrolled,
    OptedOut,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotEnrolled => "not_enrolled",
            Self::Enrolled    => "enrolled",
            Self::OptedOut    => "opted_out",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContributionDurationCategory {
    FullYear,
    PartialYear,
    /// Not in the workforce at any point of the year.
    Inactive,
}

impl ContributionDurationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullYear    => "full_year",
            Self::PartialYear => "partial_year",
            Self::Inactive    => "inactive",
        }
    }
}

/// One continuous stretch of employment. `end` is the termination date,
/// exclusive: the employee did not work on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePeriod {
    pub start: NaiveDate,
    pub end:   Option<NaiveDate>,
}

impl ServicePeriod {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.map_or(true, |e| date < e)
    }

    /// Days of this period inside [from, to).
    pub fn overlap_days(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let s = self.start.max(from);
        let e = self.end.map_or(to, |e| e.min(to));
        (e - s).num_days().max(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum TransitionCause {
    Enrollment { method: EnrollmentMethod },
    Change { reason: ChangeReason },
    /// A rehire starts a new service period outside the plan.
    Rehire,
}

/// One step of the append-only deferral history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeferralTransition {
    pub effective_date: NaiveDate,
    pub event_id:       EventId,
    pub previous_rate:  f64,
    pub new_rate:       f64,
    pub cause:          TransitionCause,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateRow {
    pub employee_id:     EmployeeId,
    pub scenario_id:     ScenarioId,
    pub plan_design_id:  PlanDesignId,
    pub simulation_year: SimYear,

    // Demographics, as of the latest hire/promotion.
    pub birth_date:         NaiveDate,
    pub job_level:          u8,
    pub location:           String,
    pub division:           String,
    pub union_code:         Option<String>,
    pub nonresident_alien:  bool,
    pub weekly_hours:       f64,
    pub excluded_from_plan: bool,

    // Employment dimension
    pub service_periods:    Vec<ServicePeriod>,
    pub employment_status:  EmploymentStatus,
    pub hire_date:          NaiveDate,
    pub termination_date:   Option<NaiveDate>,
    pub termination_reason: Option<TerminationReason>,
    pub annual_compensation:   f64,
    pub prorated_compensation: f64,
    pub contribution_duration_category: ContributionDurationCategory,

    // Enrollment dimension
    pub enrollment_status: EnrollmentStatus,
    pub enrollment_date:   Option<NaiveDate>,
    pub enrollment_method: Option<EnrollmentMethod>,

    // Deferral-rate dimension
    pub current_deferral_rate: f64,
    pub deferral_history:      Vec<DeferralTransition>,
    pub contribution_amount:   f64,
    pub employer_match_amount: f64,
}

impl StateRow {
    pub fn is_employed(&self) -> bool {
        self.employment_status != EmploymentStatus::Terminated
    }

    pub fn employed_on(&self, date: NaiveDate) -> bool {
        self.service_periods.iter().any(|p| p.covers(date))
    }

    pub fn days_employed_in(&self, year: SimYear) -> i64 {
        let (from, to) = (clock::year_start(year), clock::year_start(year + 1));
        self.service_periods.iter().map(|p| p.overlap_days(from, to)).sum()
    }

    pub fn terminated_in(&self, year: SimYear) -> bool {
        self.employment_status == EmploymentStatus::Terminated
            && self.termination_date.is_some_and(|d| clock::year_start(year) <= d && d <= clock::year_end(year))
    }

    /// Part of `year`'s workforce: worked at least one day, or left during it.
    pub fn in_workforce(&self, year: SimYear) -> bool {
        self.days_employed_in(year) > 0 || self.terminated_in(year)
    }

    pub fn current_service_start(&self) -> NaiveDate {
        self.service_periods.last().map_or(self.hire_date, |p| p.start)
    }

    pub fn is_participating(&self) -> bool {
        self.enrollment_status == EnrollmentStatus::Enrolled
    }

    /// Point-in-time view for eligibility and enrollment decisions.
    pub fn employee_snapshot(&self, as_of: NaiveDate) -> crate::eligibility::EmployeeSnapshot {
        crate::eligibility::EmployeeSnapshot::from_state(self, as_of)
    }

    fn from_hire(event: &Event, hire: &crate::event::HirePayload) -> Self {
        Self {
            employee_id:        event.employee_id.clone(),
            scenario_id:        event.scenario_id.clone(),
            plan_design_id:     event.plan_design_id.clone(),
            simulation_year:    event.simulation_year,
            birth_date:         hire.birth_date,
            job_level:          hire.job_level,
            location:           hire.location.clone(),
            division:           hire.division.clone(),
            union_code:         hire.union_code.clone(),
            nonresident_alien:  hire.nonresident_alien,
            weekly_hours:       hire.weekly_hours,
            excluded_from_plan: hire.excluded_from_plan,
            service_periods:    vec![ServicePeriod { start: event.effective_date, end: None }],
            employment_status:  employed_status(hire.excluded_from_plan),
            hire_date:          event.effective_date,
            termination_date:   None,
            termination_reason: None,
            annual_compensation:   hire.annual_compensation,
            prorated_compensation: 0.0,
            contribution_duration_category: ContributionDurationCategory::Inactive,
            enrollment_status:  EnrollmentStatus::NotEnrolled,
            enrollment_date:    None,
            enrollment_method:  None,
            current_deferral_rate: 0.0,
            deferral_history:      Vec::new(),
            contribution_amount:   0.0,
            employer_match_amount: 0.0,
        }
    }
}

fn employed_status(excluded: bool) -> EmploymentStatus {
    if excluded {
        EmploymentStatus::Excluded
    } else {
        EmploymentStatus::Active
    }
}

/// employee_id → state, ordered so that iteration is deterministic.
pub type StateTable = BTreeMap<EmployeeId, StateRow>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyIssue {
    pub employee_id: EmployeeId,
    pub event_id:    EventId,
    pub event_type:  EventType,
    pub reason:      String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FoldReport {
    pub applied:   usize,
    pub conflicts: Vec<ConsistencyIssue>,
}

impl FoldReport {
    fn absorb(&mut self, other: FoldReport) {
        self.applied += other.applied;
        self.conflicts.extend(other.conflicts);
    }
}

pub fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Compensation in force from a date onward, per employee, within one year.
type CompTimeline = Vec<(NaiveDate, f64)>;

/// Fold one year's events onto the prior year-end state.
///
/// Events of other scenarios or years are ignored (and reported).
pub fn fold_year(
    prior: &StateTable,
    events: &[Event],
    scenario_id: &str,
    year: SimYear,
    plan: &PlanRules,
) -> (StateTable, FoldReport) {
    let mut rows = prior.clone();
    let mut report = FoldReport::default();
    let year_start = clock::year_start(year);

    let mut timelines: BTreeMap<EmployeeId, CompTimeline> = rows
        .iter()
        .map(|(id, row)| (id.clone(), vec![(year_start, row.annual_compensation)]))
        .collect();

    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by(|a, b| a.ordering(b));

    for event in ordered {
        let outcome = if event.scenario_id != scenario_id || event.simulation_year != year {
            Err(conflict(event, format!(
                "event belongs to scenario {} year {}, folding {scenario_id} year {year}",
                event.scenario_id, event.simulation_year
            )))
        } else {
            apply_event(&mut rows, &mut timelines, event, year_start)
        };

        match outcome {
            Ok(()) => report.applied += 1,
            Err(SimError::Consistency { employee_id, event_id, reason }) => {
                log::warn!(
                    "year={year} accumulator: skipped {} {event_id} for {employee_id}: {reason}",
                    event.event_type.as_str()
                );
                report.conflicts.push(ConsistencyIssue {
                    employee_id,
                    event_id,
                    event_type: event.event_type,
                    reason,
                });
            }
            Err(other) => {
                log::warn!("year={year} accumulator: skipped {}: {other}", event.event_id);
                report.conflicts.push(ConsistencyIssue {
                    employee_id: event.employee_id.clone(),
                    event_id:    event.event_id.clone(),
                    event_type:  event.event_type,
                    reason:      other.to_string(),
                });
            }
        }
    }

    for (id, row) in rows.iter_mut() {
        row.simulation_year = year;
        let timeline = timelines.get(id).map(Vec::as_slice).unwrap_or(&[]);
        finalize_year(row, timeline, year, plan);
    }

    (rows, report)
}

/// Fold a complete event history from scratch, year by year, through `through_year`.
pub fn rebuild(
    events: &[Event],
    scenario_id: &str,
    through_year: SimYear,
    plan: &PlanRules,
) -> (StateTable, FoldReport) {
    let mut by_year: BTreeMap<SimYear, Vec<Event>> = BTreeMap::new();
    for e in events {
        if e.scenario_id == scenario_id && e.simulation_year <= through_year {
            by_year.entry(e.simulation_year).or_default().push(e.clone());
        }
    }

    let mut state = StateTable::new();
    let mut report = FoldReport::default();
    let Some(first_year) = by_year.keys().next().copied() else {
        return (state, report);
    };

    for year in first_year..=through_year {
        let year_events = by_year.remove(&year).unwrap_or_default();
        let (next, year_report) = fold_year(&state, &year_events, scenario_id, year, plan);
        state = next;
        report.absorb(year_report);
    }
    (state, report)
}

/// Rebuild `(scenario_id, simulation_year)` from the ledger alone.
pub fn rebuild_from_ledger(
    store: &crate::store::SimStore,
    scenario_id: &str,
    simulation_year: SimYear,
    plan: &PlanRules,
) -> SimResult<(StateTable, FoldReport)> {
    let query = crate::store::LedgerQuery::scenario(scenario_id).through_year(simulation_year);
    let events = store.query_events(query).collect::<SimResult<Vec<_>>>()?;
    Ok(rebuild(&events, scenario_id, simulation_year, plan))
}

/// Rows belonging to `year`'s workforce: what `state_as_of` exposes.
pub fn workforce_view(table: &StateTable, year: SimYear) -> StateTable {
    table
        .iter()
        .filter(|(_, row)| row.in_workforce(year))
        .map(|(id, row)| (id.clone(), row.clone()))
        .collect()
}

fn conflict(event: &Event, reason: impl Into<String>) -> SimError {
    SimError::Consistency {
        employee_id: event.employee_id.clone(),
        event_id:    event.event_id.clone(),
        reason:      reason.into(),
    }
}

fn apply_event(
    rows: &mut StateTable,
    timelines: &mut BTreeMap<EmployeeId, CompTimeline>,
    event: &Event,
    year_start: NaiveDate,
) -> SimResult<()> {
    let date = event.effective_date;

    if let EventPayload::Hire(hire) = &event.payload {
        let comp_from = date.max(year_start);
        match rows.get_mut(&event.employee_id) {
            Some(row) if row.is_employed() => {
                return Err(conflict(event, "hire of an employee who is already active"));
            }
            Some(row) => {
                if row.termination_date.is_some_and(|t| date < t) {
                    return Err(conflict(event, "rehire dated before the prior termination"));
                }
                row.service_periods.push(ServicePeriod { start: date, end: None });
                row.hire_date = date;
                row.termination_date = None;
                row.termination_reason = None;
                row.employment_status = employed_status(hire.excluded_from_plan);
                row.job_level = hire.job_level;
                row.annual_compensation = hire.annual_compensation;
                row.location = hire.location.clone();
                row.division = hire.division.clone();
                row.union_code = hire.union_code.clone();
                row.nonresident_alien = hire.nonresident_alien;
                row.weekly_hours = hire.weekly_hours;
                row.excluded_from_plan = hire.excluded_from_plan;
                if row.enrollment_status != EnrollmentStatus::NotEnrolled || row.current_deferral_rate > 0.0 {
                    row.deferral_history.push(DeferralTransition {
                        effective_date: date,
                        event_id:       event.event_id.clone(),
                        previous_rate:  row.current_deferral_rate,
                        new_rate:       0.0,
                        cause:          TransitionCause::Rehire,
                    });
                }
                row.enrollment_status = EnrollmentStatus::NotEnrolled;
                row.enrollment_date = None;
                row.enrollment_method = None;
                row.current_deferral_rate = 0.0;
            }
            None => {
                rows.insert(event.employee_id.clone(), StateRow::from_hire(event, hire));
            }
        }
        timelines
            .entry(event.employee_id.clone())
            .or_default()
            .push((comp_from, hire.annual_compensation));
        return Ok(());
    }

    let row = rows
        .get_mut(&event.employee_id)
        .ok_or_else(|| conflict(event, "no hire recorded for this employee"))?;

    match &event.payload {
        EventPayload::Hire(_) => Ok(()),
        EventPayload::Termination { reason } => {
            if !row.is_employed() {
                return Err(conflict(event, "termination of an employee who is not active"));
            }
            if date < row.current_service_start() {
                return Err(conflict(event, "termination dated before the hire"));
            }
            if let Some(period) = row.service_periods.last_mut() {
                period.end = Some(date);
            }
            row.employment_status = EmploymentStatus::Terminated;
            row.termination_date = Some(date);
            row.termination_reason = Some(*reason);
            Ok(())
        }
        EventPayload::Promotion { to_level, increase_pct, .. } => {
            require_employed(row, event)?;
            row.job_level = *to_level;
            row.annual_compensation = round_cents(row.annual_compensation * (1.0 + increase_pct));
            timelines
                .entry(event.employee_id.clone())
                .or_default()
                .push((date.max(year_start), row.annual_compensation));
            Ok(())
        }
        EventPayload::Merit { increase_pct } => {
            require_employed(row, event)?;
            row.annual_compensation = round_cents(row.annual_compensation * (1.0 + increase_pct));
            timelines
                .entry(event.employee_id.clone())
                .or_default()
                .push((date.max(year_start), row.annual_compensation));
            Ok(())
        }
        EventPayload::Enrollment { method, deferral_rate, .. } => {
            require_employed(row, event)?;
            if row.enrollment_status == EnrollmentStatus::Enrolled {
                return Err(conflict(event, "enrollment of an employee who is already enrolled"));
            }
            row.deferral_history.push(DeferralTransition {
                effective_date: date,
                event_id:       event.event_id.clone(),
                previous_rate:  row.current_deferral_rate,
                new_rate:       *deferral_rate,
                cause:          TransitionCause::Enrollment { method: *method },
            });
            row.enrollment_status = EnrollmentStatus::Enrolled;
            row.enrollment_date = Some(date);
            row.enrollment_method = Some(*method);
            row.current_deferral_rate = *deferral_rate;
            Ok(())
        }
        EventPayload::EnrollmentChange { reason, new_rate, .. } => {
            require_employed(row, event)?;
            if row.enrollment_status != EnrollmentStatus::Enrolled {
                return Err(conflict(event, "deferral change for an employee who is not enrolled"));
            }
            row.deferral_history.push(DeferralTransition {
                effective_date: date,
                event_id:       event.event_id.clone(),
                previous_rate:  row.current_deferral_rate,
                new_rate:       *new_rate,
                cause:          TransitionCause::Change { reason: *reason },
            });
            row.current_deferral_rate = *new_rate;
            if *reason == ChangeReason::OptOut || *new_rate <= 0.0 {
                row.enrollment_status = EnrollmentStatus::OptedOut;
            }
            Ok(())
        }
        EventPayload::Contribution { .. } => {
            // Contribution facts are derived from state; the fold only checks them.
            if row.days_employed_in(event.simulation_year) == 0 {
                return Err(conflict(event, "contribution for an employee with no service this year"));
            }
            Ok(())
        }
    }
}

fn require_employed(row: &StateRow, event: &Event) -> SimResult<()> {
    if !row.is_employed() {
        return Err(conflict(event, format!(
            "{} after termination with no intervening rehire",
            event.event_type.as_str()
        )));
    }
    if !row.employed_on(event.effective_date) {
        return Err(conflict(event, format!(
            "{} dated outside the current service period",
            event.event_type.as_str()
        )));
    }
    Ok(())
}

/// Recompute the year-dependent amounts of a row.
fn finalize_year(row: &mut StateRow, timeline: &[(NaiveDate, f64)], year: SimYear, plan: &PlanRules) {
    if !row.in_workforce(year) {
        row.prorated_compensation = 0.0;
        row.contribution_duration_category = ContributionDurationCategory::Inactive;
        row.contribution_amount = 0.0;
        row.employer_match_amount = 0.0;
        return;
    }

    let days_in_year = clock::days_in_year(year);
    let days_employed = row.days_employed_in(year);
    row.contribution_duration_category =
        if days_employed >= days_in_year && row.employment_status != EmploymentStatus::Terminated {
            ContributionDurationCategory::FullYear
        } else {
            ContributionDurationCategory::PartialYear
        };

    row.prorated_compensation = round_cents(prorate(row, timeline, year));

    let rate = if row.is_participating() { row.current_deferral_rate } else { 0.0 };
    row.contribution_amount = round_cents(row.prorated_compensation * rate);
    row.employer_match_amount =
        round_cents(row.prorated_compensation * plan.employer_match.match_fraction(rate));
}

/// Σ over employed days of the salary in force that day, over days in the year.
/// Equals `annual × days_employed / days_in_year` when the salary is flat.
fn prorate(row: &StateRow, timeline: &[(NaiveDate, f64)], year: SimYear) -> f64 {
    let year_start = clock::year_start(year);
    let next_year = clock::year_start(year + 1);
    let days_in_year = clock::days_in_year(year) as f64;

    if timeline.is_empty() {
        return row.annual_compensation * row.days_employed_in(year) as f64 / days_in_year;
    }

    let mut weighted = 0.0;
    for (i, (from, comp)) in timeline.iter().enumerate() {
        let seg_start = (*from).max(year_start);
        let seg_end = timeline.get(i + 1).map_or(next_year, |(d, _)| (*d).max(year_start));
        if seg_end <= seg_start {
            continue;
        }
        let days: i64 = row
            .service_periods
            .iter()
            .map(|p| p.overlap_days(seg_start, seg_end))
            .sum();
        weighted += comp * days as f64;
    }
    weighted / days_in_year
}
