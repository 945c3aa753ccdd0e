//! Simulation clock: owns the year cursor and the driver phase,
//! plus the calendar arithmetic every component shares.

use crate::types::{RunId, SimYear};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Driver state machine:
/// INIT → (GENERATE_EVENTS → APPEND_TO_LEDGER → REBUILD_ACCUMULATORS → SNAPSHOT)* → DONE
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverPhase {
    Init,
    GenerateEvents,
    AppendToLedger,
    RebuildAccumulators,
    Snapshot,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:         RunId,
    pub start_year:     SimYear,
    pub end_year:       SimYear,
    pub last_committed: Option<SimYear>,
    pub current_year:   Option<SimYear>,
    pub phase:          DriverPhase,
}

impl SimClock {
    pub fn new(run_id: RunId, start_year: SimYear, horizon_years: u32) -> Self {
        let span = horizon_years.max(1) as SimYear;
        Self {
            run_id,
            start_year,
            end_year: start_year + span - 1,
            last_committed: None,
            current_year: None,
            phase: DriverPhase::Init,
        }
    }

    /// The year the census baseline is recorded under.
    pub fn baseline_year(&self) -> SimYear {
        self.start_year - 1
    }

    /// Next year to run, or None once the horizon is exhausted.
    pub fn next_year(&self) -> Option<SimYear> {
        let next = match self.last_committed {
            Some(y) => (y + 1).max(self.start_year),
            None    => self.start_year,
        };
        (next <= self.end_year).then_some(next)
    }

    pub fn begin_year(&mut self, year: SimYear) {
        self.current_year = Some(year);
        self.phase = DriverPhase::GenerateEvents;
    }

    pub fn enter(&mut self, phase: DriverPhase) {
        self.phase = phase;
    }

    /// Mark the current year committed. Returns the committed year.
    pub fn commit_year(&mut self, year: SimYear) -> SimYear {
        self.last_committed = Some(year);
        self.current_year = None;
        self.phase = if year >= self.end_year {
            DriverPhase::Done
        } else {
            DriverPhase::GenerateEvents
        };
        year
    }

    /// Abandon the in-flight year. Nothing from it was committed.
    pub fn discard_year(&mut self) {
        self.current_year = None;
        self.phase = DriverPhase::Init;
    }

    pub fn is_done(&self) -> bool {
        self.next_year().is_none()
    }
}

// ── Calendar ─────────────────────────────────────────────────────────────────

pub fn year_start(year: SimYear) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn year_end(year: SimYear) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(NaiveDate::MAX)
}

pub fn days_in_year(year: SimYear) -> i64 {
    (year_start(year + 1) - year_start(year)).num_days()
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(chrono::Duration::days(days))
        .unwrap_or(NaiveDate::MAX)
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

pub fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN)
}

/// Whole calendar months from `from` to `to`. Zero when `to` precedes `from`.
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0) as u32
}

/// Age in whole years on `as_of`. The birthday itself counts.
pub fn age_on(birth_date: NaiveDate, as_of: NaiveDate) -> u32 {
    whole_months_between(birth_date, as_of) / 12
}

/// Date on which someone born on `birth_date` turns `years` old.
pub fn anniversary(birth_date: NaiveDate, years: u32) -> NaiveDate {
    add_months(birth_date, years.saturating_mul(12))
}

/// First day of the month after `date`'s month.
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn leap_years_have_366_days() {
        assert_eq!(days_in_year(2024), 366);
        assert_eq!(days_in_year(2025), 365);
    }

    #[test]
    fn whole_months_ignore_partial_month() {
        assert_eq!(whole_months_between(d(2024, 1, 15), d(2024, 2, 14)), 0);
        assert_eq!(whole_months_between(d(2024, 1, 15), d(2024, 2, 15)), 1);
        assert_eq!(whole_months_between(d(2024, 3, 1), d(2023, 3, 1)), 0);
    }

    #[test]
    fn age_counts_the_birthday() {
        assert_eq!(age_on(d(2004, 6, 1), d(2025, 6, 1)), 21);
        assert_eq!(age_on(d(2004, 6, 1), d(2025, 5, 31)), 20);
    }

    #[test]
    fn clock_walks_horizon() {
        let mut clock = SimClock::new("run".into(), 2025, 2);
        assert_eq!(clock.baseline_year(), 2024);
        assert_eq!(clock.next_year(), Some(2025));
        clock.begin_year(2025);
        clock.commit_year(2025);
        assert_eq!(clock.next_year(), Some(2026));
        clock.commit_year(2026);
        assert!(clock.is_done());
        assert_eq!(clock.phase, DriverPhase::Done);
    }
}
