//! State accumulator tests: proration, same-day ordering, conflicts.

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use workforce_core::{
    accumulator::{
        fold_year, rebuild, workforce_view, ContributionDurationCategory, EmploymentStatus, EnrollmentStatus,
        StateTable, TransitionCause,
    },
    config::{PlanRules, SimConfig},
    event::{
        ChangeReason, EnrollmentMethod, Event, EventOrigin, EventPayload, HirePayload, TerminationReason,
    },
    snapshot::YearSnapshot,
};

const SCENARIO: &str = "baseline";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn plan() -> PlanRules {
    SimConfig::default_test().for_scenario(SCENARIO).unwrap().plan
}

fn origin(year: i32) -> EventOrigin<'static> {
    EventOrigin {
        scenario_id:     SCENARIO,
        plan_design_id:  "standard_ae",
        simulation_year: year,
        source:          "test",
    }
}

fn hire(compensation: f64, is_rehire: bool) -> EventPayload {
    EventPayload::Hire(HirePayload {
        birth_date:          d(1985, 4, 10),
        job_level:           2,
        annual_compensation: compensation,
        location:            "HQ".into(),
        division:            "OPS".into(),
        union_code:          None,
        nonresident_alien:   false,
        weekly_hours:        40.0,
        excluded_from_plan:  false,
        is_rehire,
    })
}

fn terminate(reason: TerminationReason) -> EventPayload {
    EventPayload::Termination { reason }
}

/// E1 hired in 2020 at `compensation`, enrolled at `rate`; folded through 2024.
fn baseline(compensation: f64, rate: f64) -> StateTable {
    let o = origin(2024);
    let events = vec![
        o.event("E1", 0, d(2020, 1, 6), hire(compensation, false)),
        o.event(
            "E1",
            1,
            d(2020, 3, 1),
            EventPayload::Enrollment {
                method:                      EnrollmentMethod::Census,
                deferral_rate:               rate,
                prev_employee_deferral_rate: 0.0,
            },
        ),
    ];
    let (table, report) = fold_year(&StateTable::new(), &events, SCENARIO, 2024, &plan());
    assert!(report.conflicts.is_empty(), "{:?}", report.conflicts);
    table
}

#[test]
fn termination_prorates_compensation_and_contributions() {
    let prior = baseline(55_500.0, 0.05);
    let term = origin(2025).event("E1", 0, d(2025, 3, 15), terminate(TerminationReason::Voluntary));

    let (table, report) = fold_year(&prior, &[term], SCENARIO, 2025, &plan());
    assert!(report.conflicts.is_empty());

    let row = &table["E1"];
    assert_eq!(row.employment_status, EmploymentStatus::Terminated);
    assert_eq!(row.days_employed_in(2025), 73);
    assert_eq!(row.contribution_duration_category, ContributionDurationCategory::PartialYear);
    assert_abs_diff_eq!(row.prorated_compensation, 11_100.0, epsilon = 0.005);
    assert_abs_diff_eq!(row.contribution_amount, 555.0, epsilon = 0.005);
    // 100% on the first 3%, 50% on the next 2%.
    assert_abs_diff_eq!(row.employer_match_amount, 444.0, epsilon = 0.005);
}

#[test]
fn full_year_row_uses_whole_salary() {
    let table = baseline(55_500.0, 0.05);
    let row = &table["E1"];
    assert_eq!(row.contribution_duration_category, ContributionDurationCategory::FullYear);
    assert_abs_diff_eq!(row.prorated_compensation, 55_500.0, epsilon = 0.005);
    assert_abs_diff_eq!(row.contribution_amount, 2_775.0, epsilon = 0.005);
}

#[test]
fn mid_year_merit_weights_each_salary_by_days_in_force() {
    let prior = baseline(50_000.0, 0.0);
    let merit = origin(2025).event("E1", 0, d(2025, 7, 1), EventPayload::Merit { increase_pct: 0.10 });

    let (table, _) = fold_year(&prior, &[merit], SCENARIO, 2025, &plan());
    let row = &table["E1"];
    assert_abs_diff_eq!(row.annual_compensation, 55_000.0, epsilon = 0.005);
    // 181 days at 50,000 then 184 days at 55,000.
    assert_abs_diff_eq!(row.prorated_compensation, 52_520.55, epsilon = 0.005);
    assert_eq!(row.contribution_duration_category, ContributionDurationCategory::FullYear);
}

#[test]
fn same_day_events_apply_in_priority_order_whatever_the_input_order() {
    let prior = baseline(50_000.0, 0.04);
    let o = origin(2025);
    let day = d(2025, 6, 1);
    let events = vec![
        o.event("E1", 0, day, terminate(TerminationReason::Involuntary)),
        o.event("E1", 1, day, EventPayload::Promotion { from_level: 2, to_level: 3, increase_pct: 0.10 }),
        o.event("E1", 2, day, EventPayload::Merit { increase_pct: 0.04 }),
        o.event(
            "E1",
            3,
            day,
            EventPayload::EnrollmentChange {
                reason:        ChangeReason::Election,
                previous_rate: 0.04,
                new_rate:      0.07,
            },
        ),
    ];
    let mut reversed = events.clone();
    reversed.reverse();

    let (a, report_a) = fold_year(&prior, &events, SCENARIO, 2025, &plan());
    let (b, report_b) = fold_year(&prior, &reversed, SCENARIO, 2025, &plan());
    assert_eq!(a, b);
    assert_eq!(report_a, report_b);
    assert!(report_a.conflicts.is_empty(), "{:?}", report_a.conflicts);

    let row = &a["E1"];
    // merit (2) → promotion (3) → change (5) → termination (6)
    assert_abs_diff_eq!(row.annual_compensation, 57_200.0, epsilon = 0.005);
    assert_eq!(row.job_level, 3);
    assert_eq!(row.current_deferral_rate, 0.07);
    assert_eq!(row.employment_status, EmploymentStatus::Terminated);
    assert_eq!(row.deferral_history.len(), 2);
}

#[test]
fn rehire_opens_a_second_service_period() {
    let prior = baseline(50_000.0, 0.0);
    let o = origin(2025);
    let events = vec![
        o.event("E1", 0, d(2025, 2, 1), terminate(TerminationReason::Voluntary)),
        o.event("E1", 1, d(2025, 9, 1), hire(60_000.0, true)),
    ];

    let (table, report) = fold_year(&prior, &events, SCENARIO, 2025, &plan());
    assert!(report.conflicts.is_empty());
    let row = &table["E1"];
    assert_eq!(row.service_periods.len(), 2);
    assert_eq!(row.hire_date, d(2025, 9, 1));
    assert_eq!(row.employment_status, EmploymentStatus::Active);
    assert_eq!(row.days_employed_in(2025), 31 + 122);
    assert_eq!(row.contribution_duration_category, ContributionDurationCategory::PartialYear);
    // 31 days at 50,000 and 122 days at 60,000.
    assert_abs_diff_eq!(row.prorated_compensation, 24_301.37, epsilon = 0.005);
}

#[test]
fn rehire_starts_outside_the_plan_and_can_enroll_again() {
    let prior = baseline(50_000.0, 0.05);
    let o = origin(2025);
    let events = vec![
        o.event("E1", 0, d(2025, 2, 1), terminate(TerminationReason::Voluntary)),
        o.event("E1", 1, d(2025, 9, 1), hire(60_000.0, true)),
        o.event(
            "E1",
            2,
            d(2025, 10, 1),
            EventPayload::Enrollment {
                method:                      EnrollmentMethod::Voluntary,
                deferral_rate:               0.03,
                prev_employee_deferral_rate: 0.0,
            },
        ),
    ];

    let (table, report) = fold_year(&prior, &events, SCENARIO, 2025, &plan());
    assert!(report.conflicts.is_empty(), "{:?}", report.conflicts);
    let row = &table["E1"];
    assert_eq!(row.enrollment_status, EnrollmentStatus::Enrolled);
    assert_eq!(row.enrollment_date, Some(d(2025, 10, 1)));
    assert_eq!(row.current_deferral_rate, 0.03);
    assert_abs_diff_eq!(row.prorated_compensation, 24_301.37, epsilon = 0.005);
    assert_abs_diff_eq!(row.contribution_amount, 729.04, epsilon = 0.01);
    assert_abs_diff_eq!(row.employer_match_amount, 729.04, epsilon = 0.01);

    // The old election stays in the history, closed by the rehire.
    let rates: Vec<(f64, f64)> = row.deferral_history.iter().map(|t| (t.previous_rate, t.new_rate)).collect();
    assert_eq!(rates, [(0.0, 0.05), (0.05, 0.0), (0.0, 0.03)]);
    assert_eq!(row.deferral_history[1].cause, TransitionCause::Rehire);
    assert_eq!(row.deferral_history[1].effective_date, d(2025, 9, 1));
}

#[test]
fn rehire_without_a_new_election_contributes_nothing() {
    let prior = baseline(50_000.0, 0.05);
    let o = origin(2025);
    let events = vec![
        o.event("E1", 0, d(2025, 2, 1), terminate(TerminationReason::Voluntary)),
        o.event("E1", 1, d(2025, 9, 1), hire(60_000.0, true)),
    ];

    let (table, report) = fold_year(&prior, &events, SCENARIO, 2025, &plan());
    assert!(report.conflicts.is_empty());
    let row = &table["E1"];
    assert_eq!(row.enrollment_status, EnrollmentStatus::NotEnrolled);
    assert_eq!(row.enrollment_date, None);
    assert_eq!(row.enrollment_method, None);
    assert_eq!(row.current_deferral_rate, 0.0);
    assert_eq!(row.contribution_amount, 0.0);
    assert_eq!(row.employer_match_amount, 0.0);
    assert_eq!(row.deferral_history.len(), 2);
}

#[test]
fn conflicting_events_are_reported_and_skipped() {
    let prior = baseline(50_000.0, 0.0);
    let o = origin(2025);
    let other = EventOrigin { scenario_id: "other", ..origin(2025) };
    let events = vec![
        o.event("E1", 0, d(2025, 3, 1), terminate(TerminationReason::Voluntary)),
        o.event("E1", 1, d(2025, 5, 1), EventPayload::Promotion { from_level: 2, to_level: 3, increase_pct: 0.1 }),
        o.event(
            "GHOST",
            0,
            d(2025, 4, 1),
            EventPayload::Enrollment {
                method:                      EnrollmentMethod::Voluntary,
                deferral_rate:               0.05,
                prev_employee_deferral_rate: 0.0,
            },
        ),
        other.event("E1", 2, d(2025, 2, 1), EventPayload::Merit { increase_pct: 0.5 }),
    ];

    let (table, report) = fold_year(&prior, &events, SCENARIO, 2025, &plan());
    assert_eq!(report.applied, 1);
    assert_eq!(report.conflicts.len(), 3);
    assert!(report.conflicts.iter().any(|c| c.employee_id == "GHOST"));
    assert!(!table.contains_key("GHOST"));

    let row = &table["E1"];
    assert_eq!(row.job_level, 2);
    assert_abs_diff_eq!(row.annual_compensation, 50_000.0, epsilon = 0.005);
}

#[test]
fn earlier_leavers_stay_as_inactive_history() {
    let prior = baseline(50_000.0, 0.05);
    let term = origin(2025).event("E1", 0, d(2025, 3, 15), terminate(TerminationReason::Voluntary));
    let (y2025, _) = fold_year(&prior, &[term], SCENARIO, 2025, &plan());
    let (y2026, _) = fold_year(&y2025, &[], SCENARIO, 2026, &plan());

    let row = &y2026["E1"];
    assert_eq!(row.contribution_duration_category, ContributionDurationCategory::Inactive);
    assert_eq!(row.prorated_compensation, 0.0);
    assert_eq!(row.contribution_amount, 0.0);
    assert_eq!(row.enrollment_status, EnrollmentStatus::Enrolled);
    assert!(workforce_view(&y2025, 2025).contains_key("E1"));
    assert!(workforce_view(&y2026, 2026).is_empty());
}

#[test]
fn full_rebuild_equals_year_by_year_fold() {
    let o24 = origin(2024);
    let o25 = origin(2025);
    let events: Vec<Event> = vec![
        o24.event("E1", 0, d(2020, 1, 6), hire(50_000.0, false)),
        o24.event("E2", 0, d(2022, 8, 15), hire(70_000.0, false)),
        o25.event(
            "E2",
            0,
            d(2025, 2, 3),
            EventPayload::Enrollment {
                method:                      EnrollmentMethod::Voluntary,
                deferral_rate:               0.06,
                prev_employee_deferral_rate: 0.0,
            },
        ),
        o25.event("E1", 0, d(2025, 10, 1), terminate(TerminationReason::Retirement)),
        o25.event("E2", 1, d(2025, 7, 1), EventPayload::Merit { increase_pct: 0.03 }),
    ];

    let (full, _) = rebuild(&events, SCENARIO, 2025, &plan());

    let (y2024_events, y2025_events): (Vec<Event>, Vec<Event>) =
        events.iter().cloned().partition(|e| e.simulation_year == 2024);
    let (y2024, _) = fold_year(&StateTable::new(), &y2024_events, SCENARIO, 2024, &plan());
    let (incremental, _) = fold_year(&y2024, &y2025_events, SCENARIO, 2025, &plan());

    assert_eq!(full, incremental);
    assert_eq!(full, rebuild(&events, SCENARIO, 2025, &plan()).0);
}

#[test]
fn participation_rate_counts_only_eligible_employees() {
    let o = origin(2024);
    let mut excluded = hire(90_000.0, false);
    if let EventPayload::Hire(h) = &mut excluded {
        h.nonresident_alien = true;
    }
    let mut too_young = hire(30_000.0, false);
    if let EventPayload::Hire(h) = &mut too_young {
        h.birth_date = d(2006, 6, 1);
    }
    let events = vec![
        o.event("E1", 0, d(2020, 1, 6), hire(50_000.0, false)),
        o.event(
            "E1",
            1,
            d(2020, 3, 1),
            EventPayload::Enrollment {
                method:                      EnrollmentMethod::Census,
                deferral_rate:               0.04,
                prev_employee_deferral_rate: 0.0,
            },
        ),
        o.event("E2", 0, d(2021, 5, 3), hire(65_000.0, false)),
        o.event("E3", 0, d(2022, 2, 1), excluded),
        o.event("E4", 0, d(2024, 6, 3), too_young),
    ];
    let (table, report) = fold_year(&StateTable::new(), &events, SCENARIO, 2024, &plan());
    let snapshot = YearSnapshot::summarize(SCENARIO, 2024, &table, &events, &report, &plan());

    assert_eq!(snapshot.active_headcount, 4);
    assert_eq!(snapshot.eligible_headcount, 2);
    assert_eq!(snapshot.participants, 1);
    assert_abs_diff_eq!(snapshot.participation_rate, 0.5);
    assert_abs_diff_eq!(snapshot.average_deferral_rate, 0.04);
    assert_eq!(snapshot.hires, 4);
}
