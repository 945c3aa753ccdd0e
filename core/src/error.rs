use crate::types::{EventId, SimYear};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid or missing plan rule / scenario parameter. Fatal before generation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An event failed schema or range checks and was not appended.
    #[error("Validation error on event {event_id}: {reason}")]
    Validation { event_id: EventId, reason: String },

    /// Append of an event_id already in the ledger. Callers treat it as a no-op.
    #[error("Duplicate event {event_id}")]
    DuplicateEvent { event_id: EventId },

    /// Contradictory state found while folding the ledger.
    #[error("Consistency error for employee {employee_id} (event {event_id}): {reason}")]
    Consistency {
        employee_id: String,
        event_id: EventId,
        reason: String,
    },

    #[error("Generation for year {year} failed after {attempts} attempts: {last_error}")]
    GenerationRetriesExhausted {
        year: SimYear,
        attempts: u32,
        last_error: String,
    },

    /// Years run strictly in order: only the next uncommitted year may start.
    #[error("Year {requested} requested out of order (next year: {expected:?})")]
    YearOutOfOrder {
        requested: SimYear,
        expected: Option<SimYear>,
    },

    #[error("Scenario '{scenario_id}' not found")]
    ScenarioNotFound { scenario_id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn validation(event_id: impl Into<EventId>, reason: impl Into<String>) -> Self {
        Self::Validation {
            event_id: event_id.into(),
            reason:   reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

pub type SimResult<T> = Result<T, SimError>;
