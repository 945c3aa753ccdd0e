//! Accumulator tables: employment, enrollment and deferral-rate state.

use crate::{
    accumulator::{StateRow, StateTable},
    error::SimResult,
    types::SimYear,
};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};

/// Unit enum variants are stored as their snake_case serde names.
fn enum_to_sql<T: Serialize>(value: &T) -> SimResult<String> {
    Ok(match serde_json::to_value(value)? {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn enum_from_sql<T: DeserializeOwned>(s: String) -> SimResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(s))?)
}

pub(super) fn save(conn: &Connection, scenario_id: &str, year: SimYear, table: &StateTable) -> SimResult<()> {
    let mut employment = conn.prepare(
        "INSERT OR REPLACE INTO employment_state (
            scenario_id, simulation_year, employee_id, plan_design_id, birth_date, job_level,
            location, division, union_code, nonresident_alien, weekly_hours, excluded_from_plan,
            service_periods, employment_status, hire_date, termination_date, termination_reason,
            annual_compensation, prorated_compensation, contribution_duration_category
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
    )?;
    let mut enrollment = conn.prepare(
        "INSERT OR REPLACE INTO enrollment_state (
            scenario_id, simulation_year, employee_id, enrollment_status, enrollment_date, enrollment_method
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut deferral = conn.prepare(
        "INSERT OR REPLACE INTO deferral_rate_state (
            scenario_id, simulation_year, employee_id, current_deferral_rate, deferral_history,
            contribution_amount, employer_match_amount
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for row in table.values() {
        employment.execute(params![
            scenario_id,
            year,
            row.employee_id,
            row.plan_design_id,
            row.birth_date,
            row.job_level,
            row.location,
            row.division,
            row.union_code,
            row.nonresident_alien,
            row.weekly_hours,
            row.excluded_from_plan,
            serde_json::to_string(&row.service_periods)?,
            row.employment_status.as_str(),
            row.hire_date,
            row.termination_date,
            row.termination_reason.as_ref().map(enum_to_sql).transpose()?,
            row.annual_compensation,
            row.prorated_compensation,
            row.contribution_duration_category.as_str(),
        ])?;
        enrollment.execute(params![
            scenario_id,
            year,
            row.employee_id,
            row.enrollment_status.as_str(),
            row.enrollment_date,
            row.enrollment_method.as_ref().map(enum_to_sql).transpose()?,
        ])?;
        deferral.execute(params![
            scenario_id,
            year,
            row.employee_id,
            row.current_deferral_rate,
            serde_json::to_string(&row.deferral_history)?,
            row.contribution_amount,
            row.employer_match_amount,
        ])?;
    }
    log::debug!("year={year} accumulators: saved {} rows for {scenario_id}", table.len());
    Ok(())
}

/// Column values as read, before enum and JSON decoding.
struct RawRow {
    employee_id:           String,
    plan_design_id:        String,
    birth_date:            chrono::NaiveDate,
    job_level:             u8,
    location:              String,
    division:              String,
    union_code:            Option<String>,
    nonresident_alien:     bool,
    weekly_hours:          f64,
    excluded_from_plan:    bool,
    service_periods:       String,
    employment_status:     String,
    hire_date:             chrono::NaiveDate,
    termination_date:      Option<chrono::NaiveDate>,
    termination_reason:    Option<String>,
    annual_compensation:   f64,
    prorated_compensation: f64,
    duration_category:     String,
    enrollment_status:     String,
    enrollment_date:       Option<chrono::NaiveDate>,
    enrollment_method:     Option<String>,
    current_deferral_rate: f64,
    deferral_history:      String,
    contribution_amount:   f64,
    employer_match_amount: f64,
}

pub(super) fn load(conn: &Connection, scenario_id: &str, year: SimYear) -> SimResult<StateTable> {
    let mut stmt = conn.prepare(
        "SELECT e.employee_id, e.plan_design_id, e.birth_date, e.job_level, e.location, e.division,
                e.union_code, e.nonresident_alien, e.weekly_hours, e.excluded_from_plan,
                e.service_periods, e.employment_status, e.hire_date, e.termination_date,
                e.termination_reason, e.annual_compensation, e.prorated_compensation,
                e.contribution_duration_category,
                n.enrollment_status, n.enrollment_date, n.enrollment_method,
                d.current_deferral_rate, d.deferral_history, d.contribution_amount,
                d.employer_match_amount
         FROM employment_state e
         JOIN enrollment_state n
           ON n.scenario_id = e.scenario_id AND n.simulation_year = e.simulation_year
          AND n.employee_id = e.employee_id
         JOIN deferral_rate_state d
           ON d.scenario_id = e.scenario_id AND d.simulation_year = e.simulation_year
          AND d.employee_id = e.employee_id
         WHERE e.scenario_id = ?1 AND e.simulation_year = ?2
         ORDER BY e.employee_id",
    )?;
    let raw = stmt
        .query_map(params![scenario_id, year], |r| {
            Ok(RawRow {
                employee_id:           r.get(0)?,
                plan_design_id:        r.get(1)?,
                birth_date:            r.get(2)?,
                job_level:             r.get(3)?,
                location:              r.get(4)?,
                division:              r.get(5)?,
                union_code:            r.get(6)?,
                nonresident_alien:     r.get(7)?,
                weekly_hours:          r.get(8)?,
                excluded_from_plan:    r.get(9)?,
                service_periods:       r.get(10)?,
                employment_status:     r.get(11)?,
                hire_date:             r.get(12)?,
                termination_date:      r.get(13)?,
                termination_reason:    r.get(14)?,
                annual_compensation:   r.get(15)?,
                prorated_compensation: r.get(16)?,
                duration_category:     r.get(17)?,
                enrollment_status:     r.get(18)?,
                enrollment_date:       r.get(19)?,
                enrollment_method:     r.get(20)?,
                current_deferral_rate: r.get(21)?,
                deferral_history:      r.get(22)?,
                contribution_amount:   r.get(23)?,
                employer_match_amount: r.get(24)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = StateTable::new();
    for r in raw {
        let row = StateRow {
            employee_id:        r.employee_id.clone(),
            scenario_id:        scenario_id.to_string(),
            plan_design_id:     r.plan_design_id,
            simulation_year:    year,
            birth_date:         r.birth_date,
            job_level:          r.job_level,
            location:           r.location,
            division:           r.division,
            union_code:         r.union_code,
            nonresident_alien:  r.nonresident_alien,
            weekly_hours:       r.weekly_hours,
            excluded_from_plan: r.excluded_from_plan,
            service_periods:    serde_json::from_str(&r.service_periods)?,
            employment_status:  enum_from_sql(r.employment_status)?,
            hire_date:          r.hire_date,
            termination_date:   r.termination_date,
            termination_reason: r.termination_reason.map(enum_from_sql).transpose()?,
            annual_compensation:   r.annual_compensation,
            prorated_compensation: r.prorated_compensation,
            contribution_duration_category: enum_from_sql(r.duration_category)?,
            enrollment_status:  enum_from_sql(r.enrollment_status)?,
            enrollment_date:    r.enrollment_date,
            enrollment_method:  r.enrollment_method.map(enum_from_sql).transpose()?,
            current_deferral_rate: r.current_deferral_rate,
            deferral_history:      serde_json::from_str(&r.deferral_history)?,
            contribution_amount:   r.contribution_amount,
            employer_match_amount: r.employer_match_amount,
        };
        table.insert(r.employee_id, row);
    }
    Ok(table)
}
