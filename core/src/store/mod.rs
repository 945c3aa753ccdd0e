//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Generators and the fold never execute SQL directly.
//!
//! Everything a simulated year writes (its events, the rebuilt accumulator
//! tables, the year snapshot and the commit marker) goes through one
//! `YearTransaction`. A year is either fully present or absent.

use crate::{
    accumulator::{workforce_view, StateTable},
    error::SimResult,
    event::Event,
    snapshot::YearSnapshot,
    types::{RunId, SimYear},
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

mod accumulator;
mod ledger;

pub use ledger::{AppendOutcome, AppendReport, LedgerCursor, LedgerQuery, DEFAULT_PAGE_SIZE};

pub struct SimStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> SimResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_accumulators.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        scenario_id: &str,
        seed: u64,
        start_year: SimYear,
        horizon_years: u32,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, scenario_id, seed, version, start_year, horizon_years, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                scenario_id,
                seed as i64,
                env!("CARGO_PKG_VERSION"),
                start_year,
                horizon_years,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: &str, status: &str) -> SimResult<()> {
        self.conn.execute(
            "UPDATE run SET status = ?1, finished_at = ?2 WHERE run_id = ?3",
            params![status, Utc::now(), run_id],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> SimResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT status FROM run WHERE run_id = ?1", params![run_id], |r| r.get(0))
            .optional()?)
    }

    // ── Year commits ───────────────────────────────────────────

    /// Latest year committed for the scenario, baseline included.
    pub fn last_committed_year(&self, scenario_id: &str) -> SimResult<Option<SimYear>> {
        Ok(self.conn.query_row(
            "SELECT MAX(simulation_year) FROM year_commit WHERE scenario_id = ?1",
            params![scenario_id],
            |r| r.get::<_, Option<SimYear>>(0),
        )?)
    }

    pub fn committed_years(&self, scenario_id: &str) -> SimResult<Vec<SimYear>> {
        let mut stmt = self.conn.prepare(
            "SELECT simulation_year FROM year_commit WHERE scenario_id = ?1 ORDER BY simulation_year",
        )?;
        let years = stmt
            .query_map(params![scenario_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(years)
    }

    /// Start the single write transaction for one simulated year.
    /// Dropping it without `commit()` rolls everything back.
    pub fn begin_year(&mut self, scenario_id: &str, year: SimYear) -> SimResult<YearTransaction<'_>> {
        let tx = self.conn.transaction()?;
        Ok(YearTransaction {
            tx,
            scenario_id: scenario_id.to_string(),
            year,
        })
    }

    // ── Ledger ─────────────────────────────────────────────────

    /// Lazy, restartable cursor over the ledger in fold order.
    pub fn query_events(&self, query: LedgerQuery) -> LedgerCursor<'_> {
        LedgerCursor::new(&self.conn, query)
    }

    /// Validate and append a batch in its own transaction.
    pub fn append_events(
        &mut self,
        scenario_id: &str,
        year: SimYear,
        events: &[Event],
    ) -> SimResult<AppendReport> {
        let tx = self.conn.transaction()?;
        let report = ledger::append(&tx, scenario_id, year, events)?;
        tx.commit()?;
        Ok(report)
    }

    pub fn count_events(&self, scenario_id: &str, year: SimYear) -> SimResult<usize> {
        ledger::count(&self.conn, scenario_id, year)
    }

    // ── Accumulators ───────────────────────────────────────────

    /// The committed year-end workforce of `year`: rows with service in the
    /// year or a termination during it.
    pub fn state_as_of(&self, scenario_id: &str, year: SimYear) -> SimResult<StateTable> {
        let table = accumulator::load(&self.conn, scenario_id, year)?;
        Ok(workforce_view(&table, year))
    }

    /// Every persisted row for the year, earlier leavers included.
    pub fn load_state(&self, scenario_id: &str, year: SimYear) -> SimResult<StateTable> {
        accumulator::load(&self.conn, scenario_id, year)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn load_snapshot(&self, scenario_id: &str, year: SimYear) -> SimResult<Option<YearSnapshot>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT summary_json FROM year_snapshot WHERE scenario_id = ?1 AND simulation_year = ?2",
                params![scenario_id, year],
                |r| r.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(Into::into))
            .transpose()
    }

    pub fn snapshots(&self, scenario_id: &str) -> SimResult<Vec<YearSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT summary_json FROM year_snapshot WHERE scenario_id = ?1 ORDER BY simulation_year",
        )?;
        let rows = stmt
            .query_map(params![scenario_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(Into::into))
            .collect()
    }
}

/// All writes of one simulated year, committed together.
pub struct YearTransaction<'s> {
    tx:          Transaction<'s>,
    scenario_id: String,
    year:        SimYear,
}

impl YearTransaction<'_> {
    pub fn year(&self) -> SimYear {
        self.year
    }

    pub fn append_events(&self, events: &[Event]) -> SimResult<AppendReport> {
        ledger::append(&self.tx, &self.scenario_id, self.year, events)
    }

    /// Reads see this transaction's own appends.
    pub fn query_events(&self, query: LedgerQuery) -> LedgerCursor<'_> {
        LedgerCursor::new(&self.tx, query)
    }

    pub fn save_state(&self, table: &StateTable) -> SimResult<()> {
        accumulator::save(&self.tx, &self.scenario_id, self.year, table)
    }

    pub fn save_snapshot(&self, snapshot: &YearSnapshot) -> SimResult<()> {
        self.tx.execute(
            "INSERT OR REPLACE INTO year_snapshot (scenario_id, simulation_year, summary_json)
             VALUES (?1, ?2, ?3)",
            params![self.scenario_id, self.year, serde_json::to_string(snapshot)?],
        )?;
        Ok(())
    }

    pub fn mark_committed(&self, run_id: &RunId, event_count: usize) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO year_commit (scenario_id, simulation_year, run_id, event_count, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![self.scenario_id, self.year, run_id, event_count as i64, Utc::now()],
        )?;
        Ok(())
    }

    pub fn commit(self) -> SimResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}
