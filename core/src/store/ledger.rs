//! Event ledger queries: validated append and keyset-paged reads.

use crate::{
    error::{SimError, SimResult},
    event::{Event, EventPayload, EventType},
    types::{EmployeeId, EventId, ScenarioId, SimYear},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use std::collections::VecDeque;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Filter for a ledger read. Results always come back in fold order.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerQuery {
    pub scenario_id: ScenarioId,
    pub from_year:   Option<SimYear>,
    pub to_year:     Option<SimYear>,
    pub event_types: Vec<EventType>,
    pub employee_id: Option<EmployeeId>,
    pub page_size:   usize,
}

impl LedgerQuery {
    pub fn scenario(scenario_id: &str) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            from_year:   None,
            to_year:     None,
            event_types: Vec::new(),
            employee_id: None,
            page_size:   DEFAULT_PAGE_SIZE,
        }
    }

    pub fn year(self, year: SimYear) -> Self {
        self.years(year, year)
    }

    pub fn years(mut self, from: SimYear, to: SimYear) -> Self {
        self.from_year = Some(from);
        self.to_year = Some(to);
        self
    }

    pub fn through_year(mut self, year: SimYear) -> Self {
        self.to_year = Some(year);
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn employee(mut self, employee_id: &str) -> Self {
        self.employee_id = Some(employee_id.to_string());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses = vec!["scenario_id = ?".to_string()];
        let mut args = vec![Value::Text(self.scenario_id.clone())];
        if let Some(y) = self.from_year {
            clauses.push("simulation_year >= ?".into());
            args.push(Value::Integer(i64::from(y)));
        }
        if let Some(y) = self.to_year {
            clauses.push("simulation_year <= ?".into());
            args.push(Value::Integer(i64::from(y)));
        }
        if !self.event_types.is_empty() {
            let marks = vec!["?"; self.event_types.len()].join(", ");
            clauses.push(format!("event_type IN ({marks})"));
            args.extend(self.event_types.iter().map(|t| Value::Text(t.as_str().to_string())));
        }
        if let Some(emp) = &self.employee_id {
            clauses.push("employee_id = ?".into());
            args.push(Value::Text(emp.clone()));
        }
        (clauses.join(" AND "), args)
    }
}

/// Position of the last row handed out: the fold-order key.
#[derive(Debug, Clone, PartialEq)]
struct Keyset {
    simulation_year: SimYear,
    effective_date:  NaiveDate,
    type_priority:   u8,
    event_id:        EventId,
}

/// Lazy, finite cursor over a ledger query. Each page is one keyset
/// query; `restart()` rewinds to the first row.
pub struct LedgerCursor<'c> {
    conn:      &'c Connection,
    query:     LedgerQuery,
    buffer:    VecDeque<Event>,
    last:      Option<Keyset>,
    exhausted: bool,
}

impl<'c> LedgerCursor<'c> {
    pub(crate) fn new(conn: &'c Connection, query: LedgerQuery) -> Self {
        Self {
            conn,
            query,
            buffer: VecDeque::new(),
            last: None,
            exhausted: false,
        }
    }

    pub fn restart(&mut self) {
        self.buffer.clear();
        self.last = None;
        self.exhausted = false;
    }

    fn fetch_page(&mut self) -> SimResult<()> {
        let (mut sql_where, mut args) = self.query.where_clause();
        if let Some(k) = &self.last {
            sql_where.push_str(
                " AND (simulation_year, effective_date, type_priority, event_id) > (?, ?, ?, ?)",
            );
            args.push(Value::Integer(i64::from(k.simulation_year)));
            args.push(Value::Text(k.effective_date.to_string()));
            args.push(Value::Integer(i64::from(k.type_priority)));
            args.push(Value::Text(k.event_id.clone()));
        }
        let sql = format!(
            "SELECT event_id, scenario_id, plan_design_id, employee_id, event_type,
                    effective_date, simulation_year, payload, recorded_at
             FROM event_ledger WHERE {sql_where}
             ORDER BY simulation_year, effective_date, type_priority, event_id
             LIMIT {}",
            self.query.page_size
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(args), |r| {
                Ok(RawEvent {
                    event_id:        r.get(0)?,
                    scenario_id:     r.get(1)?,
                    plan_design_id:  r.get(2)?,
                    employee_id:     r.get(3)?,
                    event_type:      r.get(4)?,
                    effective_date:  r.get(5)?,
                    simulation_year: r.get(6)?,
                    payload:         r.get(7)?,
                    recorded_at:     r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if raw.len() < self.query.page_size {
            self.exhausted = true;
        }
        for row in raw {
            let event = row.into_event()?;
            self.last = Some(Keyset {
                simulation_year: event.simulation_year,
                effective_date:  event.effective_date,
                type_priority:   event.event_type.priority(),
                event_id:        event.event_id.clone(),
            });
            self.buffer.push_back(event);
        }
        Ok(())
    }
}

impl Iterator for LedgerCursor<'_> {
    type Item = SimResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

struct RawEvent {
    event_id:        String,
    scenario_id:     String,
    plan_design_id:  String,
    employee_id:     String,
    event_type:      String,
    effective_date:  NaiveDate,
    simulation_year: SimYear,
    payload:         String,
    recorded_at:     DateTime<Utc>,
}

impl RawEvent {
    fn into_event(self) -> SimResult<Event> {
        let event_type = EventType::parse(&self.event_type).ok_or_else(|| {
            SimError::validation(self.event_id.clone(), format!("unknown event_type {}", self.event_type))
        })?;
        let payload: EventPayload = serde_json::from_str(&self.payload)?;
        Ok(Event {
            event_id: self.event_id,
            employee_id: self.employee_id,
            scenario_id: self.scenario_id,
            plan_design_id: self.plan_design_id,
            event_type,
            effective_date: self.effective_date,
            simulation_year: self.simulation_year,
            payload,
            recorded_at: Some(self.recorded_at),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    DuplicateIgnored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendReport {
    pub outcomes: Vec<(EventId, AppendOutcome)>,
}

impl AppendReport {
    pub fn appended(&self) -> usize {
        self.count(AppendOutcome::Appended)
    }

    pub fn duplicates(&self) -> usize {
        self.count(AppendOutcome::DuplicateIgnored)
    }

    fn count(&self, outcome: AppendOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// Validate the whole batch, then insert it. Nothing is written when any
/// event fails validation.
pub(super) fn append(
    conn: &Connection,
    scenario_id: &str,
    year: SimYear,
    events: &[Event],
) -> SimResult<AppendReport> {
    for e in events {
        e.validate()?;
        if e.scenario_id != scenario_id || e.simulation_year != year {
            return Err(SimError::validation(
                e.event_id.clone(),
                format!(
                    "event for scenario {} year {} appended to scenario {scenario_id} year {year}",
                    e.scenario_id, e.simulation_year
                ),
            ));
        }
    }

    let recorded_at = Utc::now();
    let mut report = AppendReport::default();
    for e in events {
        let outcome = match insert(conn, e, recorded_at) {
            Ok(()) => AppendOutcome::Appended,
            Err(SimError::DuplicateEvent { event_id }) => {
                log::warn!("year={year} ledger: duplicate event {event_id} ignored");
                AppendOutcome::DuplicateIgnored
            }
            Err(other) => return Err(other),
        };
        report.outcomes.push((e.event_id.clone(), outcome));
    }
    log::debug!(
        "year={year} ledger: {} appended, {} duplicates for {scenario_id}",
        report.appended(),
        report.duplicates()
    );
    Ok(report)
}

fn insert(conn: &Connection, e: &Event, recorded_at: DateTime<Utc>) -> SimResult<()> {
    let changed = conn.execute(
        "INSERT INTO event_ledger (
            event_id, scenario_id, plan_design_id, employee_id, event_type,
            type_priority, effective_date, simulation_year, payload, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(event_id) DO NOTHING",
        params![
            e.event_id,
            e.scenario_id,
            e.plan_design_id,
            e.employee_id,
            e.event_type.as_str(),
            e.event_type.priority(),
            e.effective_date,
            e.simulation_year,
            e.payload_json()?,
            recorded_at,
        ],
    )?;
    if changed == 0 {
        return Err(SimError::DuplicateEvent {
            event_id: e.event_id.clone(),
        });
    }
    Ok(())
}

pub(super) fn count(conn: &Connection, scenario_id: &str, year: SimYear) -> SimResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM event_ledger WHERE scenario_id = ?1 AND simulation_year = ?2",
        params![scenario_id, year],
        |r| r.get(0),
    )?;
    Ok(n as usize)
}
