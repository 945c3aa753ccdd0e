//! Plan eligibility: a pure function of (snapshot, plan rules, as-of date).
//!
//! Checks short-circuit in a fixed order; the first failing check names
//! the result. No hidden state: the same inputs always give the same answer.

use crate::{
    accumulator::{EmploymentStatus, EnrollmentStatus, ServicePeriod, StateRow},
    clock,
    config::{EntryDatePolicy, ExclusionClass, PlanRules, ServiceComputationMethod},
    types::EmployeeId,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Hours that credit a computation period under hours counting.
pub const HOURS_PER_YEAR_OF_SERVICE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityStatus {
    NotEmployed,
    Excluded,
    PendingAge,
    PendingService,
    PendingHours,
    Eligible,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityResult {
    pub status:         EligibilityStatus,
    pub as_of_date:     NaiveDate,
    /// Set only when `status` is Eligible.
    pub entry_date:     Option<NaiveDate>,
    pub age:            u32,
    pub service_months: u32,
    pub trailing_hours: f64,
    pub exclusion:      Option<ExclusionClass>,
}

impl EligibilityResult {
    pub fn is_eligible(&self) -> bool {
        self.status == EligibilityStatus::Eligible
    }
}

/// Hours worked in [period_start, period_end).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HoursRecord {
    pub period_start: NaiveDate,
    pub period_end:   NaiveDate,
    pub hours:        f64,
}

impl HoursRecord {
    /// Hours falling inside [from, to), spread evenly over the record's days.
    fn hours_within(&self, from: NaiveDate, to: NaiveDate) -> f64 {
        let span = (self.period_end - self.period_start).num_days();
        if span <= 0 {
            return 0.0;
        }
        let s = self.period_start.max(from);
        let e = self.period_end.min(to);
        let overlap = (e - s).num_days().max(0);
        self.hours * overlap as f64 / span as f64
    }
}

/// Point-in-time view of one employee, derived from folded state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmployeeSnapshot {
    pub employee_id:           EmployeeId,
    pub as_of_date:            NaiveDate,
    pub employment_status:     EmploymentStatus,
    pub birth_date:            NaiveDate,
    pub age:                   u32,
    pub tenure_months:         u32,
    pub hours_worked_ytd:      f64,
    pub job_level:             u8,
    pub compensation:          f64,
    pub current_deferral_rate: f64,
    pub enrollment_status:     EnrollmentStatus,
    pub location:              String,
    pub division:              String,
    pub union_code:            Option<String>,
    pub nonresident_alien:     bool,
    pub service_periods:       Vec<ServicePeriod>,
    pub hours_records:         Vec<HoursRecord>,
}

impl EmployeeSnapshot {
    /// Build the snapshot of `row` as of `as_of`. Hours are synthesised per
    /// calendar month of service from the row's standard weekly hours.
    pub fn from_state(row: &StateRow, as_of: NaiveDate) -> Self {
        let service_periods: Vec<ServicePeriod> = row
            .service_periods
            .iter()
            .filter(|p| p.start <= as_of)
            .copied()
            .collect();

        let monthly_hours = row.weekly_hours * 52.0 / 12.0;
        let horizon = clock::add_days(as_of, 1);
        let mut hours_records = Vec::new();
        if let Some(current) = service_periods.last() {
            let mut month = NaiveDate::from_ymd_opt(current.start.year(), current.start.month(), 1)
                .unwrap_or(current.start);
            while month < horizon {
                let next = clock::next_month_start(month);
                let month_days = (next - month).num_days();
                let worked = current.overlap_days(month, next.min(horizon));
                if worked > 0 && month_days > 0 {
                    hours_records.push(HoursRecord {
                        period_start: month,
                        period_end:   next,
                        hours:        monthly_hours * worked as f64 / month_days as f64,
                    });
                }
                month = next;
            }
        }

        let employed = service_periods.iter().any(|p| p.covers(as_of));
        let employment_status = match (employed, row.excluded_from_plan) {
            (false, _)    => EmploymentStatus::Terminated,
            (true, true)  => EmploymentStatus::Excluded,
            (true, false) => EmploymentStatus::Active,
        };
        let ytd_from = clock::year_start(as_of.year());
        let hours_worked_ytd = hours_records.iter().map(|r| r.hours_within(ytd_from, horizon)).sum();
        let tenure_months = service_periods
            .last()
            .map_or(0, |p| clock::whole_months_between(p.start, p.end.map_or(as_of, |e| e.min(as_of))));

        Self {
            employee_id: row.employee_id.clone(),
            as_of_date: as_of,
            employment_status,
            birth_date: row.birth_date,
            age: clock::age_on(row.birth_date, as_of),
            tenure_months,
            hours_worked_ytd,
            job_level: row.job_level,
            compensation: row.annual_compensation,
            current_deferral_rate: row.current_deferral_rate,
            enrollment_status: row.enrollment_status,
            location: row.location.clone(),
            division: row.division.clone(),
            union_code: row.union_code.clone(),
            nonresident_alien: row.nonresident_alien,
            service_periods,
            hours_records,
        }
    }

    pub fn employed_on(&self, date: NaiveDate) -> bool {
        self.service_periods.iter().any(|p| p.covers(date))
    }

    fn current_service_start(&self, as_of: NaiveDate) -> Option<NaiveDate> {
        self.service_periods
            .iter()
            .filter(|p| p.start <= as_of)
            .map(|p| p.start)
            .max()
    }
}

/// Evaluate eligibility as of `as_of`.
pub fn evaluate(snapshot: &EmployeeSnapshot, rules: &PlanRules, as_of: NaiveDate) -> EligibilityResult {
    let age = clock::age_on(snapshot.birth_date, as_of);
    let mut result = EligibilityResult {
        status: EligibilityStatus::NotEmployed,
        as_of_date: as_of,
        entry_date: None,
        age,
        service_months: 0,
        trailing_hours: 0.0,
        exclusion: None,
    };

    if !snapshot.employed_on(as_of) {
        return result;
    }

    if snapshot.employment_status == EmploymentStatus::Excluded {
        result.status = EligibilityStatus::Excluded;
        return result;
    }
    if let Some(class) = rules.excluded_classes.iter().find(|c| excluded_by(snapshot, c)) {
        result.status = EligibilityStatus::Excluded;
        result.exclusion = Some(class.clone());
        return result;
    }

    if age < rules.minimum_age {
        result.status = EligibilityStatus::PendingAge;
        return result;
    }

    result.service_months = match rules.service_computation_method {
        ServiceComputationMethod::ElapsedTime => {
            elapsed_time_service(&snapshot.service_periods, as_of, rules.break_in_service_months)
        }
        ServiceComputationMethod::HoursCounting => hours_counting_service(snapshot, as_of),
    };
    if result.service_months < rules.minimum_service_months {
        result.status = EligibilityStatus::PendingService;
        return result;
    }

    if rules.minimum_hours > 0.0 {
        result.trailing_hours = trailing_hours(&snapshot.hours_records, as_of);
        if result.trailing_hours < rules.minimum_hours {
            result.status = EligibilityStatus::PendingHours;
            return result;
        }
    }

    result.status = EligibilityStatus::Eligible;
    result.entry_date = Some(entry_date(as_of, rules.entry_date_policy));
    result
}

/// First date in [from, through] on which the employee evaluates ELIGIBLE.
///
/// Candidates are `from`, the 1st of each month, the service start, the
/// minimum-age birthday and the date the service requirement is met.
pub fn first_entry_date(
    snapshot: &EmployeeSnapshot,
    rules: &PlanRules,
    from: NaiveDate,
    through: NaiveDate,
) -> Option<EligibilityResult> {
    if through < from {
        return None;
    }

    let mut candidates = vec![from];
    let mut month = clock::next_month_start(from);
    while month <= through {
        candidates.push(month);
        month = clock::next_month_start(month);
    }
    candidates.push(clock::anniversary(snapshot.birth_date, rules.minimum_age));
    for p in &snapshot.service_periods {
        candidates.push(p.start);
        candidates.push(clock::add_months(p.start, rules.minimum_service_months));
    }
    candidates.retain(|d| from <= *d && *d <= through);
    candidates.sort();
    candidates.dedup();

    candidates
        .into_iter()
        .map(|d| evaluate(snapshot, rules, d))
        .find(EligibilityResult::is_eligible)
}

fn excluded_by(snapshot: &EmployeeSnapshot, class: &ExclusionClass) -> bool {
    match class {
        ExclusionClass::JobLevel(level)   => snapshot.job_level == *level,
        ExclusionClass::Location(loc)     => &snapshot.location == loc,
        ExclusionClass::Division(div)     => &snapshot.division == div,
        ExclusionClass::UnionCode(code)   => snapshot.union_code.as_deref() == Some(code.as_str()),
        ExclusionClass::NonresidentAlien  => snapshot.nonresident_alien,
    }
}

/// Whole months of service up to `as_of`. A break shorter than
/// `break_months` keeps prior service; a break at or beyond it resets it.
pub fn elapsed_time_service(periods: &[ServicePeriod], as_of: NaiveDate, break_months: u32) -> u32 {
    let mut sorted: Vec<&ServicePeriod> = periods.iter().filter(|p| p.start <= as_of).collect();
    sorted.sort_by_key(|p| p.start);

    let mut accumulated = 0u32;
    let mut prev_end: Option<NaiveDate> = None;
    for p in sorted {
        if let Some(end) = prev_end {
            if clock::whole_months_between(end, p.start) >= break_months {
                accumulated = 0;
            }
        }
        let stop = p.end.map_or(as_of, |e| e.min(as_of));
        accumulated += clock::whole_months_between(p.start, stop);
        prev_end = Some(p.end.unwrap_or(as_of));
    }
    accumulated
}

/// Twelve months of credit per completed computation period (anchored on the
/// current service start) with at least 1000 hours.
fn hours_counting_service(snapshot: &EmployeeSnapshot, as_of: NaiveDate) -> u32 {
    let Some(start) = snapshot.current_service_start(as_of) else {
        return 0;
    };
    let day_after = clock::add_days(as_of, 1);
    let mut credited = 0u32;
    let mut k = 0u32;
    loop {
        let p_start = clock::add_months(start, 12 * k);
        let p_end = clock::add_months(start, 12 * (k + 1));
        if p_end > day_after {
            break;
        }
        let hours: f64 = snapshot
            .hours_records
            .iter()
            .map(|r| r.hours_within(p_start, p_end))
            .sum();
        if hours >= HOURS_PER_YEAR_OF_SERVICE {
            credited += 12;
        }
        k += 1;
    }
    credited
}

/// Hours in the trailing twelve months (as_of − 12 months, as_of].
pub fn trailing_hours(records: &[HoursRecord], as_of: NaiveDate) -> f64 {
    let to = clock::add_days(as_of, 1);
    let from = clock::sub_months(to, 12);
    records.iter().map(|r| r.hours_within(from, to)).sum()
}

/// Round `as_of` forward to the next date the policy allows.
/// A date already on an entry boundary is kept.
pub fn entry_date(as_of: NaiveDate, policy: EntryDatePolicy) -> NaiveDate {
    let entry_months: &[u32] = match policy {
        EntryDatePolicy::Immediate  => return as_of,
        EntryDatePolicy::Monthly    => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        EntryDatePolicy::Quarterly  => &[1, 4, 7, 10],
        EntryDatePolicy::Semiannual => &[1, 7],
    };
    if as_of.day() == 1 && entry_months.contains(&as_of.month()) {
        return as_of;
    }
    let mut candidate = clock::next_month_start(as_of);
    while !entry_months.contains(&candidate.month()) {
        candidate = clock::next_month_start(candidate);
    }
    candidate
}
