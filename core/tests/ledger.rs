//! Event ledger tests: idempotent append, validation, isolation, paging.

use chrono::NaiveDate;
use workforce_core::{
    error::SimError,
    event::{Event, EventOrigin, EventPayload, EventType, TerminationReason},
    store::{AppendOutcome, LedgerQuery, SimStore},
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn store() -> SimStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn origin(scenario_id: &'static str, year: i32) -> EventOrigin<'static> {
    EventOrigin {
        scenario_id,
        plan_design_id: "standard_ae",
        simulation_year: year,
        source: "test",
    }
}

/// One merit per employee, spread over the year.
fn merits(scenario_id: &'static str, year: i32, n: usize) -> Vec<Event> {
    let o = origin(scenario_id, year);
    (0..n)
        .map(|i| {
            let date = d(year, 1 + (i % 12) as u32, 1 + (i % 28) as u32);
            o.event(&format!("E{i:03}"), 0, date, EventPayload::Merit { increase_pct: 0.03 })
        })
        .collect()
}

#[test]
fn appending_the_same_event_twice_keeps_one_row() {
    let mut store = store();
    let events = merits("baseline", 2025, 3);

    let first = store.append_events("baseline", 2025, &events).unwrap();
    assert_eq!(first.appended(), 3);
    assert_eq!(first.duplicates(), 0);

    let again = store.append_events("baseline", 2025, &events[..1]).unwrap();
    assert_eq!(again.outcomes, vec![(events[0].event_id.clone(), AppendOutcome::DuplicateIgnored)]);
    assert_eq!(store.count_events("baseline", 2025).unwrap(), 3);

    let stored: Vec<Event> = store
        .query_events(LedgerQuery::scenario("baseline"))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|e| e.recorded_at.is_some()));
}

#[test]
fn invalid_event_rejects_the_whole_batch() {
    let mut store = store();
    let mut events = merits("baseline", 2025, 2);
    events.push(origin("baseline", 2025).event(
        "E999",
        0,
        d(2025, 5, 1),
        EventPayload::Promotion { from_level: 3, to_level: 2, increase_pct: 0.1 },
    ));

    let err = store.append_events("baseline", 2025, &events).unwrap_err();
    assert!(matches!(err, SimError::Validation { .. }), "{err}");
    assert_eq!(store.count_events("baseline", 2025).unwrap(), 0);
}

#[test]
fn events_dated_after_their_year_are_rejected() {
    let mut store = store();
    let late = origin("baseline", 2025).event(
        "E1",
        0,
        d(2026, 1, 1),
        EventPayload::Termination { reason: TerminationReason::Voluntary },
    );
    let err = store.append_events("baseline", 2025, &[late]).unwrap_err();
    assert!(matches!(err, SimError::Validation { .. }));
}

#[test]
fn mismatched_type_and_payload_is_rejected() {
    let mut store = store();
    let mut event = merits("baseline", 2025, 1).remove(0);
    event.event_type = EventType::Hire;
    let err = store.append_events("baseline", 2025, &[event]).unwrap_err();
    assert!(matches!(err, SimError::Validation { .. }));
}

#[test]
fn queries_never_cross_scenarios() {
    let mut store = store();
    store.append_events("a", 2025, &merits("a", 2025, 5)).unwrap();
    store.append_events("b", 2025, &merits("b", 2025, 7)).unwrap();

    let a: Vec<Event> = store.query_events(LedgerQuery::scenario("a")).collect::<Result<_, _>>().unwrap();
    let b: Vec<Event> = store.query_events(LedgerQuery::scenario("b")).collect::<Result<_, _>>().unwrap();
    assert_eq!(a.len(), 5);
    assert_eq!(b.len(), 7);
    assert!(a.iter().all(|e| e.scenario_id == "a"));
    assert!(b.iter().all(|e| e.scenario_id == "b"));
    // Same employee, year and generator in two scenarios: distinct ids.
    assert_ne!(a[0].event_id, b.iter().find(|e| e.employee_id == a[0].employee_id).unwrap().event_id);
}

#[test]
fn batch_for_another_scenario_is_rejected() {
    let mut store = store();
    let err = store.append_events("a", 2025, &merits("b", 2025, 1)).unwrap_err();
    assert!(matches!(err, SimError::Validation { .. }));
}

#[test]
fn cursor_pages_in_fold_order_and_restarts() {
    let mut store = store();
    let mut events = merits("baseline", 2025, 40);
    // Same-day termination must come after the merit.
    events.push(origin("baseline", 2025).event(
        "E000",
        1,
        d(2025, 1, 1),
        EventPayload::Termination { reason: TerminationReason::Voluntary },
    ));
    store.append_events("baseline", 2025, &events).unwrap();

    let mut cursor = store.query_events(LedgerQuery::scenario("baseline").year(2025).page_size(7));
    let first_pass: Vec<Event> = cursor.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(first_pass.len(), 41);
    assert!(cursor.next().is_none());
    for pair in first_pass.windows(2) {
        assert!(pair[0].ordering(&pair[1]).is_lt(), "{} !< {}", pair[0].event_id, pair[1].event_id);
    }
    let e000: Vec<EventType> = first_pass
        .iter()
        .filter(|e| e.employee_id == "E000")
        .map(|e| e.event_type)
        .collect();
    assert_eq!(e000, [EventType::Merit, EventType::Termination]);

    cursor.restart();
    let second_pass: Vec<Event> = cursor.collect::<Result<_, _>>().unwrap();
    assert_eq!(first_pass, second_pass);
}

#[test]
fn filters_by_type_employee_and_year_range() {
    let mut store = store();
    store.append_events("baseline", 2025, &merits("baseline", 2025, 10)).unwrap();
    store.append_events("baseline", 2026, &merits("baseline", 2026, 10)).unwrap();
    store
        .append_events(
            "baseline",
            2026,
            &[origin("baseline", 2026).event(
                "E004",
                1,
                d(2026, 8, 1),
                EventPayload::Termination { reason: TerminationReason::Retirement },
            )],
        )
        .unwrap();

    let count = |q: LedgerQuery| store.query_events(q).count();
    assert_eq!(count(LedgerQuery::scenario("baseline")), 21);
    assert_eq!(count(LedgerQuery::scenario("baseline").year(2026)), 11);
    assert_eq!(count(LedgerQuery::scenario("baseline").through_year(2025)), 10);
    assert_eq!(count(LedgerQuery::scenario("baseline").years(2025, 2026).employee("E004")), 3);
    assert_eq!(count(LedgerQuery::scenario("baseline").event_type(EventType::Termination)), 1);
    assert_eq!(
        count(
            LedgerQuery::scenario("baseline")
                .event_type(EventType::Termination)
                .event_type(EventType::Merit)
                .year(2025)
        ),
        10
    );
}
