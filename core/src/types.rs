//! Shared primitive types used across the entire simulation.

/// A simulation year. One driver pass = one plan year.
pub type SimYear = i32;

/// A stable, unique identifier for an employee within a scenario.
pub type EmployeeId = String;

/// Scenario isolation boundary. Every ledger and accumulator row carries one.
pub type ScenarioId = String;

/// Version key of a plan rules configuration.
pub type PlanDesignId = String;

/// Canonical event identifier (UUID text).
pub type EventId = String;

/// The canonical run identifier.
pub type RunId = String;
