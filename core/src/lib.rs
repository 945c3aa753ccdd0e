//! workforce-core: event-sourced workforce and DC plan simulation.
//!
//! One scenario runs year by year. Each year's generators emit immutable
//! events into the SQLite ledger; the accumulator tables and the year
//! snapshot are rebuilt from those events alone.

pub mod accumulator;
pub mod census;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod event;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod types;

pub mod contribution_subsystem;
pub mod deferral_escalation_subsystem;
pub mod enrollment_subsystem;
pub mod hiring_subsystem;
pub mod merit_subsystem;
pub mod promotion_subsystem;
pub mod termination_subsystem;
