//! sim-runner: headless runner for the workforce simulation.
//!
//! Usage:
//!   sim-runner --scenario baseline --db run.db
//!   sim-runner --scenario high_growth --seed 7 --years 10 --data-dir ./data
//!   sim-runner --scenario baseline --db run.db --verify --json

use anyhow::{bail, Result};
use std::env;
use workforce_core::{
    accumulator::rebuild_from_ledger,
    config::SimConfig,
    engine::SimEngine,
    snapshot::YearSnapshot,
    store::SimStore,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");
    let scenario_id = str_arg(&args, "--scenario").unwrap_or("baseline");
    let seed: Option<u64> = parse_arg(&args, "--seed");
    let years: Option<u32> = parse_arg(&args, "--years");
    let json = args.iter().any(|a| a == "--json");
    let verify = args.iter().any(|a| a == "--verify");

    let mut config = SimConfig::load(data_dir)?;
    let Some(scenario) = config.scenarios.get_mut(scenario_id) else {
        bail!("scenario '{scenario_id}' is not defined in {data_dir}/scenarios.json");
    };
    if let Some(seed) = seed {
        scenario.random_seed = seed;
    }
    if let Some(years) = years {
        scenario.horizon_years = years;
    }
    config.validate()?;
    let scenario_config = config.for_scenario(scenario_id)?;

    if !json {
        println!("workforce sim-runner");
        println!("  scenario:  {scenario_id}");
        println!("  plan:      {}", scenario_config.plan_design_id());
        println!("  seed:      {}", scenario_config.scenario.random_seed);
        println!(
            "  years:     {}..={}",
            scenario_config.scenario.start_year,
            scenario_config.scenario.start_year + scenario_config.scenario.horizon_years as i32 - 1
        );
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let store = SimStore::open(db)?;
    store.migrate()?;

    let run_id = new_run_id(scenario_id, scenario_config.scenario.random_seed);
    let plan = scenario_config.plan.clone();
    let mut engine = SimEngine::build(run_id.clone(), scenario_config, store);
    let ran = engine.run()?;

    let store = engine.into_store();
    let snapshots = store.snapshots(scenario_id)?;
    if json {
        for s in &snapshots {
            println!("{}", serde_json::to_string(s)?);
        }
    } else {
        print_summary(&run_id, ran.len(), &snapshots);
    }

    if verify {
        let mut mismatched = 0;
        for year in store.committed_years(scenario_id)? {
            let stored = store.load_state(scenario_id, year)?;
            let (rebuilt, report) = rebuild_from_ledger(&store, scenario_id, year, &plan)?;
            if stored != rebuilt {
                mismatched += 1;
                log::warn!("year={year} verify: stored accumulators differ from a full rebuild");
            }
            if !json {
                println!(
                    "  verify {year}: {} rows, {} events applied, {} conflicts, {}",
                    rebuilt.len(),
                    report.applied,
                    report.conflicts.len(),
                    if stored == rebuilt { "ok" } else { "MISMATCH" }
                );
            }
        }
        if mismatched > 0 {
            bail!("{mismatched} year(s) failed the rebuild check");
        }
    }

    Ok(())
}

fn print_summary(run_id: &str, years_run: usize, snapshots: &[YearSnapshot]) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:     {run_id}");
    println!("  years run:  {years_run}");
    println!();
    println!(
        "  {:>4} | {:>6} | {:>6} | {:>5} | {:>5} | {:>5} | {:>6} | {:>7} | {:>14} | {:>12}",
        "year", "active", "elig", "hires", "terms", "promo", "part%", "avg def", "employee $", "match $"
    );
    for s in snapshots {
        println!(
            "  {:>4} | {:>6} | {:>6} | {:>5} | {:>5} | {:>5} | {:>5.1}% | {:>6.2}% | {:>14.2} | {:>12.2}",
            s.simulation_year,
            s.active_headcount,
            s.eligible_headcount,
            s.hires,
            s.terminations,
            s.promotions,
            s.participation_rate * 100.0,
            s.average_deferral_rate * 100.0,
            s.total_employee_contributions,
            s.total_employer_match,
        );
    }
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    str_arg(args, flag).and_then(|v| v.parse().ok())
}

fn new_run_id(scenario_id: &str, seed: u64) -> String {
    format!("run-{scenario_id}-{seed}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}
