//! Enrollment decision engine tests: dedup, auto window, opt-out, rates.

use chrono::{Datelike, NaiveDate};
use workforce_core::{
    accumulator::{fold_year, EnrollmentStatus, StateRow, StateTable},
    config::{EnrollmentModelConfig, PlanRules, SimConfig},
    enrollment::{EnrollmentDecisionEngine, EnrollmentRegistry},
    event::{ChangeReason, EnrollmentMethod, EventOrigin, EventPayload, EventType, HirePayload},
    rng::{GeneratorSlot, RngBank, SubsystemRng},
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn config() -> SimConfig {
    SimConfig::default_test()
}

fn rng(employee_id: &str, year: i32) -> SubsystemRng {
    RngBank::new(42).for_employee(GeneratorSlot::Enrollment, year, employee_id)
}

/// Mid-career, moderate income: both demographic multipliers are 1.0.
fn new_hire(employee_id: &str, hired: NaiveDate, plan_design_id: &str) -> StateRow {
    let year = hired.year();
    let origin = EventOrigin {
        scenario_id:     "baseline",
        plan_design_id,
        simulation_year: year,
        source:          "test",
    };
    let hire = origin.event(
        employee_id,
        0,
        hired,
        EventPayload::Hire(HirePayload {
            birth_date:          d(1985, 3, 1),
            job_level:           2,
            annual_compensation: 70_000.0,
            location:            "HQ".into(),
            division:            "OPS".into(),
            union_code:          None,
            nonresident_alien:   false,
            weekly_hours:        40.0,
            excluded_from_plan:  false,
            is_rehire:           false,
        }),
    );
    let plan = config().plan_designs[plan_design_id].clone();
    let (table, _) = fold_year(&StateTable::new(), &[hire], "baseline", year, &plan);
    table[employee_id].clone()
}

fn no_pre_auto_elections(model: &EnrollmentModelConfig) -> EnrollmentModelConfig {
    EnrollmentModelConfig { pre_auto_voluntary_share: 0.0, ..model.clone() }
}

#[test]
fn registry_allows_one_enrollment_per_employee_plan_year() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let engine = EnrollmentDecisionEngine::new("baseline", &cfg.enrollment_model, 2025);
    let row = new_hire("E1", d(2025, 2, 3), "standard_ae");
    let snapshot = row.employee_snapshot(d(2025, 12, 31));

    let mut registry = EnrollmentRegistry::new();
    let first = engine.decide(&snapshot, plan, 2025, &mut registry, &mut rng("E1", 2025));
    let second = engine.decide(&snapshot, plan, 2025, &mut registry, &mut rng("E1", 2025));

    let first = first.expect("a new hire in an auto plan enrolls in the first year");
    assert_eq!(first.event_type, EventType::Enrollment);
    assert!(second.is_none());
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("E1", "standard_ae", 2025));
    assert!(!registry.contains("E1", "standard_ae", 2026));

    // A registry rebuilt from the ledger blocks the same key.
    let mut from_ledger = EnrollmentRegistry::from_events([&first]);
    assert!(engine.decide(&snapshot, plan, 2025, &mut from_ledger, &mut rng("E1", 2025)).is_none());
}

#[test]
fn auto_enrollment_fires_at_the_window_boundary() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let model = no_pre_auto_elections(&cfg.enrollment_model);
    let engine = EnrollmentDecisionEngine::new("baseline", &model, 2025);
    let row = new_hire("E1", d(2025, 2, 3), "standard_ae");

    let event = engine
        .decide(&row.employee_snapshot(d(2025, 12, 31)), plan, 2025, &mut EnrollmentRegistry::new(), &mut rng("E1", 2025))
        .expect("auto enrollment");
    assert_eq!(event.effective_date, d(2025, 3, 20));
    match event.payload {
        EventPayload::Enrollment { method, deferral_rate, prev_employee_deferral_rate } => {
            assert_eq!(method, EnrollmentMethod::Auto);
            assert_eq!(deferral_rate, 0.06);
            assert_eq!(prev_employee_deferral_rate, 0.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn window_crossing_year_end_fires_the_next_year() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let model = no_pre_auto_elections(&cfg.enrollment_model);
    let engine = EnrollmentDecisionEngine::new("baseline", &model, 2025);
    let row = new_hire("E7", d(2025, 12, 1), "standard_ae");

    let this_year = engine.decide(
        &row.employee_snapshot(d(2025, 12, 31)),
        plan,
        2025,
        &mut EnrollmentRegistry::new(),
        &mut rng("E7", 2025),
    );
    assert!(this_year.is_none());

    let next_year = engine
        .decide(&row.employee_snapshot(d(2026, 12, 31)), plan, 2026, &mut EnrollmentRegistry::new(), &mut rng("E7", 2026))
        .expect("window closes in 2026");
    assert_eq!(next_year.effective_date, d(2026, 1, 15));
    assert_eq!(next_year.simulation_year, 2026);
}

#[test]
fn voluntary_only_plan_enrolls_after_the_entry_date() {
    let cfg = config();
    let plan = &cfg.plan_designs["voluntary_only"];
    let model = EnrollmentModelConfig { base_probability: 1.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("no_auto", &model, 2025);
    let row = new_hire("E2", d(2024, 1, 2), "voluntary_only");

    let event = engine
        .decide(&row.employee_snapshot(d(2025, 12, 31)), plan, 2025, &mut EnrollmentRegistry::new(), &mut rng("E2", 2025))
        .expect("probability 1.0 always enrolls");
    // Twelve months of service on 2025-01-02, next quarterly entry 2025-04-01.
    assert!(event.effective_date >= d(2025, 4, 1));
    assert!(event.effective_date < d(2025, 5, 31));
    match event.payload {
        EventPayload::Enrollment { method, deferral_rate, .. } => {
            assert_eq!(method, EnrollmentMethod::Voluntary);
            assert!((0.01..=0.10).contains(&deferral_rate));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn auto_enrollment_can_be_followed_by_an_opt_out() {
    let cfg = config();
    let plan = PlanRules {
        auto_enrollment: workforce_core::config::AutoEnrollmentConfig {
            opt_out_rate: 1.0,
            ..cfg.plan_designs["standard_ae"].auto_enrollment.clone()
        },
        ..cfg.plan_designs["standard_ae"].clone()
    };
    let model = no_pre_auto_elections(&cfg.enrollment_model);
    let engine = EnrollmentDecisionEngine::new("baseline", &model, 2025);
    let row = new_hire("E3", d(2025, 2, 3), "standard_ae");
    let snapshot = row.employee_snapshot(d(2025, 12, 31));
    let mut stream = rng("E3", 2025);

    let enrollment = engine
        .decide(&snapshot, &plan, 2025, &mut EnrollmentRegistry::new(), &mut stream)
        .expect("auto enrollment");
    let opt_out = engine
        .decide_opt_out(&enrollment, &snapshot, &plan, &mut stream)
        .expect("opt_out_rate 1.0 always opts out");

    assert!(opt_out.effective_date > enrollment.effective_date);
    assert!(opt_out.effective_date <= d(2025, 6, 18));
    assert_ne!(opt_out.event_id, enrollment.event_id);
    assert_eq!(
        opt_out.payload,
        EventPayload::EnrollmentChange { reason: ChangeReason::OptOut, previous_rate: 0.06, new_rate: 0.0 }
    );
}

#[test]
fn only_auto_enrollments_are_opted_out() {
    let cfg = config();
    let plan = &cfg.plan_designs["voluntary_only"];
    let model = EnrollmentModelConfig { base_probability: 1.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("no_auto", &model, 2025);
    let row = new_hire("E4", d(2024, 1, 2), "voluntary_only");
    let snapshot = row.employee_snapshot(d(2025, 12, 31));
    let mut stream = rng("E4", 2025);

    let voluntary = engine
        .decide(&snapshot, plan, 2025, &mut EnrollmentRegistry::new(), &mut stream)
        .expect("voluntary enrollment");
    assert!(engine.decide_opt_out(&voluntary, &snapshot, plan, &mut stream).is_none());
}

#[test]
fn drawn_rates_respect_bounds_and_match_bias() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let row = new_hire("E5", d(2020, 1, 6), "standard_ae");
    let snapshot = row.employee_snapshot(d(2025, 1, 1));

    let biased = EnrollmentModelConfig { match_bias: 1.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("baseline", &biased, 2025);
    assert_eq!(engine.draw_deferral_rate(&snapshot, plan, &mut rng("E5", 2025)), 0.05);

    let engine = EnrollmentDecisionEngine::new("baseline", &cfg.enrollment_model, 2025);
    let mut stream = rng("E5", 2025);
    for _ in 0..500 {
        let rate = engine.draw_deferral_rate(&snapshot, plan, &mut stream);
        assert!((0.01..=0.10).contains(&rate), "rate {rate} out of bounds");
    }
}

#[test]
fn participation_probability_is_clamped() {
    let cfg = config();
    let model = EnrollmentModelConfig { base_probability: 0.95, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("baseline", &model, 2025);

    let mut snapshot = new_hire("E6", d(2020, 1, 6), "standard_ae").employee_snapshot(d(2025, 1, 1));
    snapshot.age = 60;
    snapshot.compensation = 250_000.0;
    assert_eq!(engine.participation_probability(&snapshot), 1.0);

    snapshot.age = 40;
    snapshot.compensation = 70_000.0;
    assert!((engine.participation_probability(&snapshot) - 0.95).abs() < 1e-12);
}

#[test]
fn election_inside_the_window_replaces_the_auto_event() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let model = EnrollmentModelConfig {
        base_probability: 1.0,
        pre_auto_voluntary_share: 1.0,
        ..cfg.enrollment_model.clone()
    };
    let engine = EnrollmentDecisionEngine::new("baseline", &model, 2025);
    let row = new_hire("E8", d(2025, 2, 3), "standard_ae");
    let snapshot = row.employee_snapshot(d(2025, 12, 31));
    let mut registry = EnrollmentRegistry::new();
    let mut stream = rng("E8", 2025);

    let event = engine
        .decide(&snapshot, plan, 2025, &mut registry, &mut stream)
        .expect("certain election");
    // Inside the 45-day window, before the automatic date of 2025-03-20.
    assert!(event.effective_date >= d(2025, 2, 3));
    assert!(event.effective_date <= d(2025, 3, 19));
    match event.payload {
        EventPayload::Enrollment { method, deferral_rate, prev_employee_deferral_rate } => {
            assert_eq!(method, EnrollmentMethod::Voluntary);
            assert!((0.01..=0.10).contains(&deferral_rate));
            assert_eq!(prev_employee_deferral_rate, 0.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    // No second, automatic event for the same year, and no opt-out.
    assert!(engine.decide(&snapshot, plan, 2025, &mut registry, &mut stream).is_none());
    assert!(engine.decide_opt_out(&event, &snapshot, plan, &mut stream).is_none());
}

#[test]
fn opted_out_employee_can_convert_in_a_later_year() {
    let cfg = config();
    let plan = &cfg.plan_designs["standard_ae"];
    let mut snapshot = new_hire("E9", d(2020, 1, 6), "standard_ae").employee_snapshot(d(2026, 12, 31));
    snapshot.enrollment_status = EnrollmentStatus::OptedOut;
    snapshot.current_deferral_rate = 0.0;

    let certain = EnrollmentModelConfig { voluntary_conversion_rate: 1.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("baseline", &certain, 2025);
    let event = engine
        .decide(&snapshot, plan, 2026, &mut EnrollmentRegistry::new(), &mut rng("E9", 2026))
        .expect("conversion rate 1.0 always converts");
    assert_eq!(event.simulation_year, 2026);
    assert_eq!(event.effective_date.year(), 2026);
    match event.payload {
        EventPayload::Enrollment { method, deferral_rate, prev_employee_deferral_rate } => {
            assert_eq!(method, EnrollmentMethod::Voluntary);
            assert!((0.01..=0.10).contains(&deferral_rate));
            assert_eq!(prev_employee_deferral_rate, 0.0);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let never = EnrollmentModelConfig { voluntary_conversion_rate: 0.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("baseline", &never, 2025);
    assert!(engine
        .decide(&snapshot, plan, 2026, &mut EnrollmentRegistry::new(), &mut rng("E9", 2026))
        .is_none());
}

#[test]
fn long_eligible_non_participant_converts_year_over_year() {
    let cfg = config();
    let plan = &cfg.plan_designs["voluntary_only"];
    let row = new_hire("E10", d(2020, 1, 6), "voluntary_only");
    let snapshot = row.employee_snapshot(d(2026, 12, 31));

    let certain = EnrollmentModelConfig { voluntary_conversion_rate: 1.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("no_auto", &certain, 2025);
    let event = engine
        .decide(&snapshot, plan, 2026, &mut EnrollmentRegistry::new(), &mut rng("E10", 2026))
        .expect("conversion rate 1.0 always converts");
    assert_eq!(event.effective_date.year(), 2026);
    assert_eq!(event.plan_design_id, "voluntary_only");
    assert!(matches!(
        event.payload,
        EventPayload::Enrollment { method: EnrollmentMethod::Voluntary, prev_employee_deferral_rate, .. }
            if prev_employee_deferral_rate == 0.0
    ));

    let never = EnrollmentModelConfig { voluntary_conversion_rate: 0.0, ..cfg.enrollment_model.clone() };
    let engine = EnrollmentDecisionEngine::new("no_auto", &never, 2025);
    assert!(engine
        .decide(&snapshot, plan, 2026, &mut EnrollmentRegistry::new(), &mut rng("E10", 2026))
        .is_none());
}
