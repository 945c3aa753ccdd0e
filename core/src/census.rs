//! Baseline census: the workforce as it stands before the first simulated year.
//!
//! The census is recorded in the ledger like everything else: one hire per
//! service period (earlier periods closed by a `census_history` termination)
//! and an enrollment for anyone already participating. All of it is dated in
//! the baseline year, `start_year - 1`.

use crate::{
    clock,
    config::{EnrollmentModelConfig, WorkforceConfig, ELECTED_RATE_CEILING, ELECTED_RATE_FLOOR},
    error::{SimError, SimResult},
    event::{
        EnrollmentMethod, Event, EventOrigin, EventPayload, HirePayload, TerminationReason, MAX_DEFERRAL_RATE,
    },
    rng::{GeneratorSlot, RngBank, SubsystemRng},
    types::{EmployeeId, SimYear},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CENSUS_SOURCE: &str = "census";

pub(crate) const NONRESIDENT_ALIEN_SHARE: f64 = 0.02;
const PRIOR_SERVICE_SHARE: f64 = 0.06;
const CENSUS_MIN_PLAN_AGE: u32 = 21;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PriorService {
    pub hire_date:        NaiveDate,
    pub termination_date: NaiveDate,
}

/// One employee of the baseline census.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CensusRecord {
    pub employee_id:         EmployeeId,
    pub birth_date:          NaiveDate,
    pub hire_date:           NaiveDate,
    pub job_level:           u8,
    pub annual_compensation: f64,
    pub location:            String,
    pub division:            String,
    #[serde(default)]
    pub union_code:          Option<String>,
    #[serde(default)]
    pub nonresident_alien:   bool,
    #[serde(default = "full_time")]
    pub weekly_hours:        f64,
    #[serde(default)]
    pub excluded_from_plan:  bool,
    /// Earlier, closed periods of employment, oldest first.
    #[serde(default)]
    pub prior_service:       Vec<PriorService>,
    /// Present when the employee already participates.
    #[serde(default)]
    pub deferral_rate:       Option<f64>,
    #[serde(default)]
    pub enrollment_date:     Option<NaiveDate>,
}

fn full_time() -> f64 {
    40.0
}

impl CensusRecord {
    pub fn validate(&self, baseline_year: SimYear) -> SimResult<()> {
        let err = |msg: String| Err(SimError::config(format!("census {}: {msg}", self.employee_id)));
        let baseline_end = clock::year_end(baseline_year);

        if self.employee_id.is_empty() {
            return Err(SimError::config("census record without employee_id"));
        }
        if self.hire_date > baseline_end {
            return err(format!("hire_date {} is after the baseline year {baseline_year}", self.hire_date));
        }
        if self.birth_date >= self.hire_date {
            return err("birth_date must precede hire_date".into());
        }
        if !(self.annual_compensation.is_finite() && self.annual_compensation > 0.0) {
            return err(format!("compensation {} must be positive", self.annual_compensation));
        }
        let mut floor = self.birth_date;
        for p in &self.prior_service {
            if !(floor < p.hire_date && p.hire_date < p.termination_date) {
                return err(format!("prior service {} to {} is out of order", p.hire_date, p.termination_date));
            }
            floor = p.termination_date;
        }
        if floor > self.hire_date {
            return err("prior service overlaps the current hire".into());
        }
        if let Some(rate) = self.deferral_rate {
            if !(rate.is_finite() && (0.0..=MAX_DEFERRAL_RATE).contains(&rate)) {
                return err(format!("deferral rate {rate} outside [0, {MAX_DEFERRAL_RATE}]"));
            }
        }
        if let Some(d) = self.enrollment_date {
            if self.deferral_rate.is_none() {
                return err("enrollment_date without deferral_rate".into());
            }
            if d < self.hire_date || d > baseline_end {
                return err(format!("enrollment_date {d} outside the current service period"));
            }
        }
        Ok(())
    }

    fn hire_payload(&self, is_rehire: bool) -> HirePayload {
        HirePayload {
            birth_date:          self.birth_date,
            job_level:           self.job_level,
            annual_compensation: self.annual_compensation,
            location:            self.location.clone(),
            division:            self.division.clone(),
            union_code:          self.union_code.clone(),
            nonresident_alien:   self.nonresident_alien,
            weekly_hours:        self.weekly_hours,
            excluded_from_plan:  self.excluded_from_plan,
            is_rehire,
        }
    }
}

/// Generate a synthetic census of `initial_headcount` employees.
pub fn synthesize(
    workforce: &WorkforceConfig,
    model: &EnrollmentModelConfig,
    baseline_year: SimYear,
    bank: &RngBank,
) -> Vec<CensusRecord> {
    (1..=workforce.initial_headcount)
        .map(|n| {
            let employee_id = format!("EMP_{n:06}");
            let mut rng = bank.for_employee(GeneratorSlot::Census, baseline_year, &employee_id);
            synthesize_one(employee_id, workforce, model, baseline_year, &mut rng)
        })
        .collect()
}

fn synthesize_one(
    employee_id: EmployeeId,
    workforce: &WorkforceConfig,
    model: &EnrollmentModelConfig,
    baseline_year: SimYear,
    rng: &mut SubsystemRng,
) -> CensusRecord {
    let baseline_end = clock::year_end(baseline_year);

    let weights: Vec<f64> = workforce.levels.iter().map(|l| l.hire_weight).collect();
    let level = rng
        .weighted_index(&weights)
        .and_then(|i| workforce.levels.get(i))
        .or_else(|| workforce.levels.first());
    let (job_level, annual_compensation) = match level {
        Some(l) => (l.level, (rng.uniform(l.compensation_min, l.compensation_max)).round()),
        None => (1, 50_000.0),
    };

    let max_tenure_days = i64::from(workforce.census_max_tenure_years.max(1)) * 365;
    let tenure_days = rng.next_u64_below(max_tenure_days as u64) as i64;
    let hire_date = clock::add_days(baseline_end, -tenure_days);

    let age_span = u64::from(workforce.hire_age_max - workforce.hire_age_min);
    let hire_age = workforce.hire_age_min + rng.next_u64_below(age_span) as u32;
    let birth_offset = i64::from(hire_age) * 365 + rng.next_u64_below(365) as i64;
    let birth_date = clock::add_days(hire_date, -birth_offset);

    let weekly_hours = if rng.chance(workforce.part_time_share) {
        workforce.part_time_weekly_hours
    } else {
        workforce.full_time_weekly_hours
    };
    let location = rng.pick(&workforce.locations).cloned().unwrap_or_default();
    let division = rng.pick(&workforce.divisions).cloned().unwrap_or_default();
    let nonresident_alien = rng.chance(NONRESIDENT_ALIEN_SHARE);

    let mut prior_service = Vec::new();
    if rng.chance(PRIOR_SERVICE_SHARE) {
        let gap = 30 + rng.next_u64_below(3 * 365) as i64;
        let length = 180 + rng.next_u64_below(4 * 365) as i64;
        let termination_date = clock::add_days(hire_date, -gap);
        let prior_hire = clock::add_days(termination_date, -length);
        if prior_hire > clock::anniversary(birth_date, workforce.hire_age_min) {
            prior_service.push(PriorService { hire_date: prior_hire, termination_date });
        }
    }

    let (deferral_rate, enrollment_date) = if clock::age_on(birth_date, baseline_end) >= CENSUS_MIN_PLAN_AGE
        && !nonresident_alien
        && rng.chance(workforce.census_participation_rate)
    {
        let weights: Vec<f64> = model.rate_options.iter().map(|o| o.weight).collect();
        let rate = rng
            .weighted_index(&weights)
            .and_then(|i| model.rate_options.get(i))
            .map_or(ELECTED_RATE_FLOOR, |o| o.rate)
            .clamp(ELECTED_RATE_FLOOR, ELECTED_RATE_CEILING);
        let lag = 30 + rng.next_u64_below(90) as i64;
        (Some(rate), Some(clock::add_days(hire_date, lag).min(baseline_end)))
    } else {
        (None, None)
    };

    CensusRecord {
        employee_id,
        birth_date,
        hire_date,
        job_level,
        annual_compensation,
        location,
        division,
        union_code: None,
        nonresident_alien,
        weekly_hours,
        excluded_from_plan: false,
        prior_service,
        deferral_rate,
        enrollment_date,
    }
}

/// Translate census records into baseline-year events.
pub fn baseline_events(
    records: &[CensusRecord],
    scenario_id: &str,
    plan_design_id: &str,
    baseline_year: SimYear,
) -> SimResult<Vec<Event>> {
    let origin = EventOrigin {
        scenario_id,
        plan_design_id,
        simulation_year: baseline_year,
        source: CENSUS_SOURCE,
    };

    let mut events = Vec::new();
    for rec in records {
        rec.validate(baseline_year)?;
        let mut seq = 0u32;
        let mut next_seq = || {
            seq += 1;
            seq - 1
        };

        for prior in &rec.prior_service {
            events.push(origin.event(
                &rec.employee_id,
                next_seq(),
                prior.hire_date,
                EventPayload::Hire(rec.hire_payload(false)),
            ));
            events.push(origin.event(
                &rec.employee_id,
                next_seq(),
                prior.termination_date,
                EventPayload::Termination { reason: TerminationReason::CensusHistory },
            ));
        }
        events.push(origin.event(
            &rec.employee_id,
            next_seq(),
            rec.hire_date,
            EventPayload::Hire(rec.hire_payload(!rec.prior_service.is_empty())),
        ));
        if let Some(rate) = rec.deferral_rate {
            events.push(origin.event(
                &rec.employee_id,
                next_seq(),
                rec.enrollment_date.unwrap_or(rec.hire_date),
                EventPayload::Enrollment {
                    method:                      EnrollmentMethod::Census,
                    deferral_rate:               rate,
                    prev_employee_deferral_rate: 0.0,
                },
            ));
        }
    }
    log::info!(
        "year={baseline_year} census: {} employees, {} baseline events",
        records.len(),
        events.len()
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    #[test]
    fn synthetic_census_is_reproducible_and_valid() {
        let config = SimConfig::default_test();
        let bank = RngBank::new(42);
        let a = synthesize(&config.workforce, &config.enrollment_model, 2024, &bank);
        let b = synthesize(&config.workforce, &config.enrollment_model, 2024, &bank);
        assert_eq!(a, b);
        assert_eq!(a.len(), config.workforce.initial_headcount as usize);
        for rec in &a {
            rec.validate(2024).unwrap();
        }
    }

    #[test]
    fn prior_service_becomes_hire_termination_pairs() {
        let rec = CensusRecord {
            employee_id:         "EMP_000001".into(),
            birth_date:          NaiveDate::from_ymd_opt(1980, 5, 1).unwrap(),
            hire_date:           NaiveDate::from_ymd_opt(2020, 1, 6).unwrap(),
            job_level:           2,
            annual_compensation: 70_000.0,
            location:            "HQ".into(),
            division:            "OPS".into(),
            union_code:          None,
            nonresident_alien:   false,
            weekly_hours:        40.0,
            excluded_from_plan:  false,
            prior_service:       vec![PriorService {
                hire_date:        NaiveDate::from_ymd_opt(2010, 3, 1).unwrap(),
                termination_date: NaiveDate::from_ymd_opt(2014, 6, 30).unwrap(),
            }],
            deferral_rate:       Some(0.05),
            enrollment_date:     None,
        };
        let events = baseline_events(&[rec], "baseline", "standard_ae", 2024).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, ["hire", "termination", "hire", "enrollment"]);
        assert!(events.iter().all(|e| e.simulation_year == 2024));
        assert!(events.iter().all(|e| e.validate().is_ok()));
    }

    #[test]
    fn hire_after_baseline_is_rejected() {
        let mut rec = synthesize(
            &SimConfig::default_test().workforce,
            &SimConfig::default_test().enrollment_model,
            2024,
            &RngBank::new(1),
        )
        .remove(0);
        rec.hire_date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert!(matches!(rec.validate(2024), Err(SimError::Configuration(_))));
    }
}
