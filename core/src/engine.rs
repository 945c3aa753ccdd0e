//! The simulation driver: one scenario, year after year.
//!
//! STATE MACHINE:
//!   INIT → (per year: GENERATE_EVENTS → APPEND_TO_LEDGER
//!           → REBUILD_ACCUMULATORS → SNAPSHOT) → DONE
//!
//! STAGE ORDER (fixed, documented, never reordered):
//!   1. Attrition      termination
//!   2. Workforce      hiring, promotion, merit
//!   3. Benefits       enrollment, escalation
//!   4. Contributions  contribution
//!
//! RULES:
//!   - Years run strictly in order. Year Y reads only the committed state
//!     at the end of Y - 1; no generator ever sees a later year's event.
//!   - Generators in one stage run in parallel; each stage sees the events
//!     and provisional fold of the stages before it.
//!   - A generator failure discards the whole year and regenerates it.
//!   - APPEND, REBUILD, SNAPSHOT and the commit marker share one SQLite
//!     transaction. A year is committed entirely or not at all.
//!   - All randomness flows through the RngBank.

use crate::{
    accumulator::{fold_year, StateTable},
    census,
    clock::{self, DriverPhase, SimClock},
    config::ScenarioConfig,
    contribution_subsystem::ContributionSubsystem,
    deferral_escalation_subsystem::DeferralEscalationSubsystem,
    enrollment_subsystem::EnrollmentSubsystem,
    error::{SimError, SimResult},
    event::{sort_events, Event},
    hiring_subsystem::HiringSubsystem,
    merit_subsystem::MeritSubsystem,
    promotion_subsystem::PromotionSubsystem,
    rng::RngBank,
    snapshot::YearSnapshot,
    store::{LedgerQuery, SimStore},
    subsystem::{EventGenerator, Stage, YearContext},
    termination_subsystem::TerminationSubsystem,
    types::{RunId, SimYear},
};
use rayon::prelude::*;

pub struct SimEngine {
    pub run_id:   RunId,
    pub clock:    SimClock,
    pub rng_bank: RngBank,
    config:       ScenarioConfig,
    generators:   Vec<Box<dyn EventGenerator>>,
    store:        SimStore,
    /// Committed state at the end of `clock.last_committed`.
    state:        StateTable,
    initialized:  bool,
}

impl SimEngine {
    pub fn new(run_id: RunId, config: ScenarioConfig, store: SimStore) -> Self {
        Self {
            clock: SimClock::new(run_id.clone(), config.scenario.start_year, config.scenario.horizon_years),
            rng_bank: RngBank::new(config.scenario.random_seed),
            config,
            generators: Vec::new(),
            store,
            state: StateTable::new(),
            initialized: false,
            run_id,
        }
    }

    /// Build a fully wired engine with all generators registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(run_id: RunId, config: ScenarioConfig, store: SimStore) -> Self {
        let mut engine = SimEngine::new(run_id, config, store);
        engine.register(Box::new(TerminationSubsystem::new()));
        engine.register(Box::new(HiringSubsystem::new()));
        engine.register(Box::new(PromotionSubsystem::new()));
        engine.register(Box::new(MeritSubsystem::new()));
        engine.register(Box::new(EnrollmentSubsystem::new()));
        engine.register(Box::new(DeferralEscalationSubsystem::new()));
        engine.register(Box::new(ContributionSubsystem::new()));
        engine
    }

    /// Register a generator. Within a stage, output keeps registration order.
    pub fn register(&mut self, generator: Box<dyn EventGenerator>) {
        self.generators.push(generator);
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    pub fn into_store(self) -> SimStore {
        self.store
    }

    /// Committed state at the end of the last committed year.
    pub fn state(&self) -> &StateTable {
        &self.state
    }

    /// INIT: record the run, then either resume after the last committed
    /// year or seed the baseline year from the census.
    pub fn init(&mut self) -> SimResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.clock.enter(DriverPhase::Init);
        let scenario = &self.config.scenario;
        self.store.insert_run(
            &self.run_id,
            &scenario.scenario_id,
            scenario.random_seed,
            scenario.start_year,
            scenario.horizon_years,
        )?;

        match self.store.last_committed_year(&scenario.scenario_id)? {
            Some(year) => {
                self.state = self.store.load_state(&scenario.scenario_id, year)?;
                self.clock.last_committed = Some(year);
                log::info!(
                    "year={year} engine: resuming {} with {} rows",
                    scenario.scenario_id,
                    self.state.len()
                );
            }
            None => self.seed_baseline()?,
        }
        self.initialized = true;
        Ok(())
    }

    fn seed_baseline(&mut self) -> SimResult<()> {
        let baseline = self.clock.baseline_year();
        let records = match &self.config.census {
            Some(records) => records.clone(),
            None => census::synthesize(
                &self.config.workforce,
                &self.config.enrollment_model,
                baseline,
                &self.rng_bank,
            ),
        };
        let events = census::baseline_events(
            &records,
            self.config.scenario_id(),
            self.config.plan_design_id(),
            baseline,
        )?;
        self.clock.begin_year(baseline);
        self.commit(baseline, events)?;
        Ok(())
    }

    /// Run every remaining year of the horizon.
    pub fn run(&mut self) -> SimResult<Vec<YearSnapshot>> {
        let mut snapshots = Vec::new();
        let outcome = self.run_remaining(&mut snapshots);

        let status = if outcome.is_ok() { "completed" } else { "failed" };
        if let Err(e) = self.store.finish_run(&self.run_id, status) {
            log::warn!("engine: could not mark run {} {status}: {e}", self.run_id);
        }
        outcome?;
        self.clock.enter(DriverPhase::Done);
        Ok(snapshots)
    }

    fn run_remaining(&mut self, snapshots: &mut Vec<YearSnapshot>) -> SimResult<()> {
        self.init()?;
        while let Some(year) = self.clock.next_year() {
            snapshots.push(self.run_year(year)?);
        }
        Ok(())
    }

    /// Run at most `n` more years. Used for testing and incremental runs.
    pub fn run_years(&mut self, n: u32) -> SimResult<Vec<YearSnapshot>> {
        self.init()?;
        let mut snapshots = Vec::new();
        for _ in 0..n {
            let Some(year) = self.clock.next_year() else { break };
            snapshots.push(self.run_year(year)?);
        }
        Ok(snapshots)
    }

    /// One full pass of the state machine for `year`, which must be the
    /// next uncommitted year of the horizon.
    pub fn run_year(&mut self, year: SimYear) -> SimResult<YearSnapshot> {
        self.init()?;
        let expected = self.clock.next_year();
        if expected != Some(year) {
            return Err(SimError::YearOutOfOrder { requested: year, expected });
        }
        let attempts = self.config.max_generation_retries + 1;
        let mut attempt = 0;
        let events = loop {
            attempt += 1;
            self.clock.begin_year(year);
            match self.generate(year) {
                Ok(events) => break events,
                Err(e) if attempt < attempts => {
                    log::warn!("year={year} engine: generation attempt {attempt}/{attempts} failed: {e}");
                    self.clock.discard_year();
                }
                Err(e) => {
                    log::warn!("year={year} engine: giving up after {attempt} attempts: {e}");
                    self.clock.discard_year();
                    return Err(SimError::GenerationRetriesExhausted {
                        year,
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        };
        self.commit(year, events)
    }

    /// GENERATE_EVENTS: run the stages in order over the committed state.
    fn generate(&self, year: SimYear) -> SimResult<Vec<Event>> {
        let scenario_id = self.config.scenario_id();
        let mut events: Vec<Event> = Vec::new();

        for stage in Stage::ORDER {
            let (provisional, _) = fold_year(&self.state, &events, scenario_id, year, &self.config.plan);
            let ctx = YearContext {
                config: &self.config,
                year,
                prior_state: &self.state,
                provisional_state: &provisional,
            };
            // The store's connection is not Sync: share only these across threads.
            let (generators, rng_bank, events_so_far) = (&self.generators, &self.rng_bank, &events);
            let batches: Vec<(&'static str, SimResult<Vec<Event>>)> = generators
                .par_iter()
                .filter(|g| g.stage() == stage)
                .map(|g| (g.name(), g.generate(&ctx, events_so_far, rng_bank)))
                .collect();

            for (name, batch) in batches {
                let batch = batch.map_err(|e| {
                    log::warn!("year={year} {name}: {e}");
                    e
                })?;
                for e in &batch {
                    check_in_year(e, scenario_id, year)?;
                }
                events.extend(batch);
            }
            log::debug!("year={year} engine: {} stage done, {} events so far", stage.as_str(), events.len());
        }

        sort_events(&mut events);
        Ok(events)
    }

    /// APPEND_TO_LEDGER → REBUILD_ACCUMULATORS → SNAPSHOT, in one transaction.
    fn commit(&mut self, year: SimYear, events: Vec<Event>) -> SimResult<YearSnapshot> {
        let scenario_id = self.config.scenario.scenario_id.clone();
        let tx = self.store.begin_year(&scenario_id, year)?;

        self.clock.enter(DriverPhase::AppendToLedger);
        let report = tx.append_events(&events)?;

        self.clock.enter(DriverPhase::RebuildAccumulators);
        let year_events = tx
            .query_events(LedgerQuery::scenario(&scenario_id).year(year))
            .collect::<SimResult<Vec<_>>>()?;
        let (state, fold) = fold_year(&self.state, &year_events, &scenario_id, year, &self.config.plan);
        tx.save_state(&state)?;

        self.clock.enter(DriverPhase::Snapshot);
        let snapshot = YearSnapshot::summarize(&scenario_id, year, &state, &year_events, &fold, &self.config.plan);
        tx.save_snapshot(&snapshot)?;
        tx.mark_committed(&self.run_id, year_events.len())?;
        tx.commit()?;

        self.state = state;
        self.clock.commit_year(year);
        log::info!(
            "year={year} engine: committed {} events ({} duplicates), headcount {}, participation {:.1}%",
            report.appended(),
            report.duplicates(),
            snapshot.active_headcount,
            snapshot.participation_rate * 100.0
        );
        if !fold.conflicts.is_empty() {
            log::warn!("year={year} engine: {} consistency conflicts skipped", fold.conflicts.len());
        }
        Ok(snapshot)
    }
}

/// Generated events must belong to this scenario and fall inside the year.
fn check_in_year(event: &Event, scenario_id: &str, year: SimYear) -> SimResult<()> {
    if event.scenario_id != scenario_id || event.simulation_year != year {
        return Err(SimError::validation(
            event.event_id.clone(),
            format!("generated for scenario {} year {}", event.scenario_id, event.simulation_year),
        ));
    }
    if event.effective_date < clock::year_start(year) || event.effective_date > clock::year_end(year) {
        return Err(SimError::validation(
            event.event_id.clone(),
            format!("effective_date {} outside {year}", event.effective_date),
        ));
    }
    Ok(())
}
