use crate::{
    census::CensusRecord,
    error::{SimError, SimResult},
    event::MAX_DEFERRAL_RATE,
    types::{PlanDesignId, ScenarioId, SimYear},
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_BREAK_IN_SERVICE_MONTHS: u32 = 60;
pub const DEFAULT_GENERATION_RETRIES: u32 = 3;
/// An auto-enrollment window longer than a year would skip a whole plan year.
pub const MAX_AUTO_ENROLLMENT_WINDOW_DAYS: u32 = 365;

/// Deferral rates the enrollment engine may elect on an employee's behalf.
pub const ELECTED_RATE_FLOOR: f64 = 0.01;
pub const ELECTED_RATE_CEILING: f64 = 0.10;

// ── Plan rules ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceComputationMethod {
    ElapsedTime,
    HoursCounting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryDatePolicy {
    Immediate,
    Monthly,
    Quarterly,
    Semiannual,
}

/// Classes of employee the plan document excludes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "class", content = "value", rename_all = "snake_case")]
pub enum ExclusionClass {
    JobLevel(u8),
    Location(String),
    Division(String),
    UnionCode(String),
    /// Statutory exclusion: non-resident alien with no US-source income.
    NonresidentAlien,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoEnrollmentScope {
    #[default]
    NewHiresOnly,
    AllEligible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoEnrollmentConfig {
    pub enabled:      bool,
    pub default_rate: f64,
    pub window_days:  u32,
    #[serde(default)]
    pub scope:        AutoEnrollmentScope,
    #[serde(default)]
    pub opt_out_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeferralEscalationConfig {
    pub enabled:         bool,
    pub increment:       f64,
    pub cap:             f64,
    pub effective_month: u32,
    pub effective_day:   u32,
}

impl Default for DeferralEscalationConfig {
    fn default() -> Self {
        Self {
            enabled:         false,
            increment:       0.01,
            cap:             0.10,
            effective_month: 1,
            effective_day:   1,
        }
    }
}

impl DeferralEscalationConfig {
    pub fn effective_date(&self, year: SimYear) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.effective_month, self.effective_day)
    }
}

/// One band of the match formula: `match_rate` of every deferred percent
/// between `employee_min` and `employee_max`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchTier {
    pub employee_min: f64,
    pub employee_max: f64,
    pub match_rate:   f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmployerMatchConfig {
    #[serde(default)]
    pub tiers: Vec<MatchTier>,
}

impl EmployerMatchConfig {
    /// Smallest deferral rate that captures the full match.
    pub fn match_maximizing_rate(&self) -> Option<f64> {
        self.tiers
            .iter()
            .filter(|t| t.match_rate > 0.0)
            .map(|t| t.employee_max)
            .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))
    }

    /// Employer match as a fraction of compensation at `deferral_rate`.
    pub fn match_fraction(&self, deferral_rate: f64) -> f64 {
        self.tiers
            .iter()
            .map(|t| {
                let band = (deferral_rate.min(t.employee_max) - t.employee_min).max(0.0);
                band * t.match_rate
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanRules {
    pub plan_design_id:            PlanDesignId,
    pub minimum_age:               u32,
    pub minimum_service_months:    u32,
    pub service_computation_method: ServiceComputationMethod,
    #[serde(default = "default_break_in_service")]
    pub break_in_service_months:   u32,
    #[serde(default)]
    pub minimum_hours:             f64,
    pub entry_date_policy:         EntryDatePolicy,
    #[serde(default)]
    pub excluded_classes:          Vec<ExclusionClass>,
    pub auto_enrollment:           AutoEnrollmentConfig,
    #[serde(default)]
    pub deferral_escalation:       DeferralEscalationConfig,
    #[serde(default)]
    pub employer_match:            EmployerMatchConfig,
}

fn default_break_in_service() -> u32 {
    DEFAULT_BREAK_IN_SERVICE_MONTHS
}

impl PlanRules {
    pub fn validate(&self) -> SimResult<()> {
        let id = &self.plan_design_id;
        let err = |msg: String| Err(SimError::config(format!("plan design '{id}': {msg}")));

        if id.is_empty() {
            return Err(SimError::config("plan_design_id must not be empty"));
        }
        if self.minimum_age > 100 {
            return err(format!("minimum_age {} is not plausible", self.minimum_age));
        }
        if !(self.minimum_hours.is_finite() && self.minimum_hours >= 0.0) {
            return err(format!("minimum_hours {} must be >= 0", self.minimum_hours));
        }
        if self.break_in_service_months == 0 {
            return err("break_in_service_months must be > 0".into());
        }
        let ae = &self.auto_enrollment;
        if !(0.0..=MAX_DEFERRAL_RATE).contains(&ae.default_rate) {
            return err(format!("auto_enrollment.default_rate {} outside [0, {MAX_DEFERRAL_RATE}]", ae.default_rate));
        }
        if ae.enabled && ae.default_rate <= 0.0 {
            return err("auto_enrollment.default_rate must be > 0 when enabled".into());
        }
        if ae.window_days > MAX_AUTO_ENROLLMENT_WINDOW_DAYS {
            return err(format!(
                "auto_enrollment.window_days {} exceeds {MAX_AUTO_ENROLLMENT_WINDOW_DAYS}",
                ae.window_days
            ));
        }
        if !(0.0..=1.0).contains(&ae.opt_out_rate) {
            return err(format!("auto_enrollment.opt_out_rate {} outside [0, 1]", ae.opt_out_rate));
        }
        let esc = &self.deferral_escalation;
        if esc.enabled {
            if !(esc.increment > 0.0 && esc.increment <= esc.cap && esc.cap <= MAX_DEFERRAL_RATE) {
                return err(format!(
                    "deferral_escalation increment {} / cap {} inconsistent",
                    esc.increment, esc.cap
                ));
            }
            if esc.effective_date(2023).is_none() {
                return err(format!(
                    "deferral_escalation date {}/{} is not a valid calendar day",
                    esc.effective_month, esc.effective_day
                ));
            }
        }
        for tier in &self.employer_match.tiers {
            if !(tier.employee_min >= 0.0
                && tier.employee_min < tier.employee_max
                && tier.employee_max <= MAX_DEFERRAL_RATE
                && tier.match_rate >= 0.0)
            {
                return err(format!(
                    "match tier [{}, {}] @ {} is malformed",
                    tier.employee_min, tier.employee_max, tier.match_rate
                ));
            }
        }
        Ok(())
    }
}

// ── Workforce assumptions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    pub level:            u8,
    pub label:            String,
    pub compensation_min: f64,
    pub compensation_max: f64,
    /// Share of new hires landing at this level.
    pub hire_weight:      f64,
    pub termination_rate: f64,
    pub promotion_rate:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkforceConfig {
    pub initial_headcount:           u32,
    pub census_max_tenure_years:     u32,
    pub census_participation_rate:   f64,
    pub target_growth_rate:          f64,
    #[serde(default = "one")]
    pub termination_rate_multiplier: f64,
    /// Share of the year's new hires who leave before year end.
    #[serde(default)]
    pub new_hire_termination_rate:   f64,
    /// Share of hires drawn from former employees.
    #[serde(default)]
    pub rehire_share:                f64,
    pub retirement_age:              u32,
    pub merit_rate:                  f64,
    pub cola_rate:                   f64,
    pub merit_effective_month:       u32,
    pub merit_effective_day:         u32,
    pub promotion_increase_pct:      f64,
    #[serde(default = "one")]
    pub promotion_rate_multiplier:   f64,
    pub hire_age_min:                u32,
    pub hire_age_max:                u32,
    pub part_time_share:             f64,
    pub full_time_weekly_hours:      f64,
    pub part_time_weekly_hours:      f64,
    pub locations:                   Vec<String>,
    pub divisions:                   Vec<String>,
    pub levels:                      Vec<LevelConfig>,
}

fn one() -> f64 {
    1.0
}

impl WorkforceConfig {
    pub fn level(&self, level: u8) -> Option<&LevelConfig> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn merit_effective_date(&self, year: SimYear) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.merit_effective_month, self.merit_effective_day)
    }

    pub fn validate(&self) -> SimResult<()> {
        let err = |msg: String| Err(SimError::config(format!("workforce: {msg}")));
        let unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);

        if self.levels.is_empty() {
            return err("at least one job level is required".into());
        }
        let mut seen = BTreeSet::new();
        for l in &self.levels {
            if !seen.insert(l.level) {
                return err(format!("job level {} defined twice", l.level));
            }
            if !(l.compensation_min > 0.0 && l.compensation_min <= l.compensation_max) {
                return err(format!("level {} compensation range is malformed", l.level));
            }
            if !(unit(l.termination_rate) && unit(l.promotion_rate) && l.hire_weight >= 0.0) {
                return err(format!("level {} rates must lie in [0, 1]", l.level));
            }
        }
        if self.levels.iter().map(|l| l.hire_weight).sum::<f64>() <= 0.0 {
            return err("level hire weights must sum to > 0".into());
        }
        if !(unit(self.census_participation_rate) && unit(self.part_time_share)) {
            return err("participation rate and part-time share must lie in [0, 1]".into());
        }
        if !(unit(self.rehire_share) && unit(self.new_hire_termination_rate) && self.new_hire_termination_rate < 1.0) {
            return err("rehire share and new-hire termination rate must lie in [0, 1)".into());
        }
        if !(self.target_growth_rate.is_finite() && self.target_growth_rate > -1.0) {
            return err(format!("target_growth_rate {} must be > -1", self.target_growth_rate));
        }
        if self.termination_rate_multiplier < 0.0 || self.promotion_rate_multiplier < 0.0 {
            return err("rate multipliers must be >= 0".into());
        }
        if !(self.merit_rate > -0.5 && self.cola_rate > -0.5 && self.promotion_increase_pct >= 0.0) {
            return err("merit, cola and promotion increases are out of range".into());
        }
        if self.merit_effective_date(2023).is_none() {
            return err("merit effective month/day is not a calendar day".into());
        }
        if self.hire_age_min >= self.hire_age_max || self.hire_age_min < 14 {
            return err(format!("hire age range {}..{} is malformed", self.hire_age_min, self.hire_age_max));
        }
        for h in [self.full_time_weekly_hours, self.part_time_weekly_hours] {
            if !(h > 0.0 && h <= 80.0) {
                return err(format!("weekly hours {h} out of range"));
            }
        }
        if self.locations.is_empty() || self.divisions.is_empty() {
            return err("locations and divisions must not be empty".into());
        }
        Ok(())
    }
}

// ── Enrollment behaviour model ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgeSegment {
    pub name:                   String,
    /// Inclusive upper bound. The last segment should be open-ended (e.g. 200).
    pub max_age:                u32,
    pub probability_multiplier: f64,
    /// Added to a drawn deferral rate for this segment.
    pub rate_shift:             f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncomeSegment {
    pub name:                   String,
    /// Inclusive upper bound; None for the top segment.
    pub max_compensation:       Option<f64>,
    pub probability_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateOption {
    pub rate:   f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrollmentModelConfig {
    /// Probability before demographic multipliers; calibrated to ~60% participation.
    pub base_probability:          f64,
    pub age_segments:              Vec<AgeSegment>,
    pub income_segments:           Vec<IncomeSegment>,
    pub rate_options:              Vec<RateOption>,
    /// Probability of electing exactly the match-maximizing rate.
    pub match_bias:                f64,
    /// Share of the demographic probability that acts before auto-enrollment fires.
    pub pre_auto_voluntary_share:  f64,
    pub voluntary_conversion_rate: f64,
    pub opt_out_window_days:       u32,
    /// Days after the entry date within which a voluntary election lands.
    pub voluntary_election_lag_days: u32,
}

impl EnrollmentModelConfig {
    pub fn age_segment(&self, age: u32) -> Option<&AgeSegment> {
        self.age_segments
            .iter()
            .find(|s| age <= s.max_age)
            .or_else(|| self.age_segments.last())
    }

    pub fn income_segment(&self, compensation: f64) -> Option<&IncomeSegment> {
        self.income_segments
            .iter()
            .find(|s| s.max_compensation.map_or(true, |m| compensation <= m))
            .or_else(|| self.income_segments.last())
    }

    pub fn validate(&self) -> SimResult<()> {
        let err = |msg: String| Err(SimError::config(format!("enrollment_model: {msg}")));
        let unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);

        for (name, p) in [
            ("base_probability", self.base_probability),
            ("match_bias", self.match_bias),
            ("pre_auto_voluntary_share", self.pre_auto_voluntary_share),
            ("voluntary_conversion_rate", self.voluntary_conversion_rate),
        ] {
            if !unit(p) {
                return err(format!("{name} {p} outside [0, 1]"));
            }
        }
        if self.age_segments.is_empty() || self.income_segments.is_empty() {
            return err("age and income segments are required".into());
        }
        if self.age_segments.iter().any(|s| s.probability_multiplier < 0.0)
            || self.income_segments.iter().any(|s| s.probability_multiplier < 0.0)
        {
            return err("segment multipliers must be >= 0".into());
        }
        if self.rate_options.is_empty()
            || self.rate_options.iter().any(|o| o.weight < 0.0 || !o.rate.is_finite())
            || self.rate_options.iter().map(|o| o.weight).sum::<f64>() <= 0.0
        {
            return err("rate_options need non-negative weights summing to > 0".into());
        }
        Ok(())
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

/// Typed scenario overrides. Unknown keys are rejected at load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterOverrides {
    #[serde(default)]
    pub target_growth_rate:             Option<f64>,
    #[serde(default)]
    pub termination_rate_multiplier:    Option<f64>,
    #[serde(default)]
    pub merit_rate:                     Option<f64>,
    #[serde(default)]
    pub cola_rate:                      Option<f64>,
    #[serde(default)]
    pub promotion_rate_multiplier:      Option<f64>,
    #[serde(default)]
    pub base_participation_probability: Option<f64>,
    #[serde(default)]
    pub voluntary_conversion_rate:      Option<f64>,
    #[serde(default)]
    pub auto_enrollment_enabled:        Option<bool>,
    #[serde(default)]
    pub auto_enrollment_default_rate:   Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub scenario_id:         ScenarioId,
    pub plan_design_id:      PlanDesignId,
    pub random_seed:         u64,
    pub start_year:          SimYear,
    pub horizon_years:       u32,
    #[serde(default)]
    pub parameter_overrides: ParameterOverrides,
}

// ── Top level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub plan_designs:           BTreeMap<PlanDesignId, PlanRules>,
    pub workforce:              WorkforceConfig,
    pub enrollment_model:       EnrollmentModelConfig,
    pub scenarios:              BTreeMap<ScenarioId, Scenario>,
    pub census:                 Option<Vec<CensusRecord>>,
    pub max_generation_retries: u32,
}

/// Everything one scenario run needs, overrides already applied.
/// Immutable for the life of the run.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub scenario:               Scenario,
    pub plan:                   PlanRules,
    pub workforce:              WorkforceConfig,
    pub enrollment_model:       EnrollmentModelConfig,
    pub census:                 Option<Vec<CensusRecord>>,
    pub max_generation_retries: u32,
}

impl ScenarioConfig {
    pub fn scenario_id(&self) -> &str {
        &self.scenario.scenario_id
    }

    pub fn plan_design_id(&self) -> &str {
        &self.plan.plan_design_id
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanDesignsFile {
    plan_designs: Vec<PlanRules>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenariosFile {
    scenarios: Vec<Scenario>,
    #[serde(default)]
    max_generation_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CensusFile {
    employees: Vec<CensusRecord>,
}

fn read_json<T: DeserializeOwned>(path: &str) -> SimResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SimError::config(format!("Cannot read {path}: {e}")))?;
    serde_json::from_str(&content).map_err(|e| SimError::config(format!("Cannot parse {path}: {e}")))
}

impl SimConfig {
    /// Load from the data/ directory.
    /// In tests, use SimConfig::default_test().
    pub fn load(data_dir: &str) -> SimResult<Self> {
        let plans: PlanDesignsFile = read_json(&format!("{data_dir}/plan_designs.json"))?;
        let workforce: WorkforceConfig = read_json(&format!("{data_dir}/workforce.json"))?;
        let enrollment_model: EnrollmentModelConfig =
            read_json(&format!("{data_dir}/enrollment_model.json"))?;
        let scenarios: ScenariosFile = read_json(&format!("{data_dir}/scenarios.json"))?;

        let census_path = format!("{data_dir}/census.json");
        let census = if std::path::Path::new(&census_path).exists() {
            let file: CensusFile = read_json(&census_path)?;
            Some(file.employees)
        } else {
            None
        };

        let config = Self {
            plan_designs: plans
                .plan_designs
                .into_iter()
                .map(|p| (p.plan_design_id.clone(), p))
                .collect(),
            workforce,
            enrollment_model,
            scenarios: scenarios
                .scenarios
                .into_iter()
                .map(|s| (s.scenario_id.clone(), s))
                .collect(),
            census,
            max_generation_retries: scenarios
                .max_generation_retries
                .unwrap_or(DEFAULT_GENERATION_RETRIES),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.plan_designs.is_empty() {
            return Err(SimError::config("no plan designs configured"));
        }
        for plan in self.plan_designs.values() {
            plan.validate()?;
        }
        self.workforce.validate()?;
        self.enrollment_model.validate()?;
        for s in self.scenarios.values() {
            if !self.plan_designs.contains_key(&s.plan_design_id) {
                return Err(SimError::config(format!(
                    "scenario '{}' references unknown plan design '{}'",
                    s.scenario_id, s.plan_design_id
                )));
            }
            if s.horizon_years == 0 {
                return Err(SimError::config(format!(
                    "scenario '{}' has an empty horizon",
                    s.scenario_id
                )));
            }
        }
        if let Some(census) = &self.census {
            let mut ids = BTreeSet::new();
            for rec in census {
                if !ids.insert(rec.employee_id.as_str()) {
                    return Err(SimError::config(format!(
                        "census lists employee '{}' twice",
                        rec.employee_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve a scenario into its effective, immutable configuration.
    pub fn for_scenario(&self, scenario_id: &str) -> SimResult<ScenarioConfig> {
        let scenario = self
            .scenarios
            .get(scenario_id)
            .cloned()
            .ok_or_else(|| SimError::ScenarioNotFound {
                scenario_id: scenario_id.to_string(),
            })?;
        let mut plan = self
            .plan_designs
            .get(&scenario.plan_design_id)
            .cloned()
            .ok_or_else(|| {
                SimError::config(format!("unknown plan design '{}'", scenario.plan_design_id))
            })?;
        let mut workforce = self.workforce.clone();
        let mut enrollment_model = self.enrollment_model.clone();

        let o = &scenario.parameter_overrides;
        if let Some(v) = o.target_growth_rate {
            workforce.target_growth_rate = v;
        }
        if let Some(v) = o.termination_rate_multiplier {
            workforce.termination_rate_multiplier = v;
        }
        if let Some(v) = o.merit_rate {
            workforce.merit_rate = v;
        }
        if let Some(v) = o.cola_rate {
            workforce.cola_rate = v;
        }
        if let Some(v) = o.promotion_rate_multiplier {
            workforce.promotion_rate_multiplier = v;
        }
        if let Some(v) = o.base_participation_probability {
            enrollment_model.base_probability = v;
        }
        if let Some(v) = o.voluntary_conversion_rate {
            enrollment_model.voluntary_conversion_rate = v;
        }
        if let Some(v) = o.auto_enrollment_enabled {
            plan.auto_enrollment.enabled = v;
        }
        if let Some(v) = o.auto_enrollment_default_rate {
            plan.auto_enrollment.default_rate = v;
        }

        plan.validate()?;
        workforce.validate()?;
        enrollment_model.validate()?;

        Ok(ScenarioConfig {
            scenario,
            plan,
            workforce,
            enrollment_model,
            census: self.census.clone(),
            max_generation_retries: self.max_generation_retries,
        })
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        let auto_plan = PlanRules {
            plan_design_id:             "standard_ae".into(),
            minimum_age:                21,
            minimum_service_months:     0,
            service_computation_method: ServiceComputationMethod::ElapsedTime,
            break_in_service_months:    DEFAULT_BREAK_IN_SERVICE_MONTHS,
            minimum_hours:              0.0,
            entry_date_policy:          EntryDatePolicy::Immediate,
            excluded_classes:           vec![ExclusionClass::NonresidentAlien],
            auto_enrollment: AutoEnrollmentConfig {
                enabled:      true,
                default_rate: 0.06,
                window_days:  45,
                scope:        AutoEnrollmentScope::NewHiresOnly,
                opt_out_rate: 0.10,
            },
            deferral_escalation: DeferralEscalationConfig {
                enabled:         true,
                increment:       0.01,
                cap:             0.10,
                effective_month: 1,
                effective_day:   1,
            },
            employer_match: EmployerMatchConfig {
                tiers: vec![
                    MatchTier { employee_min: 0.0,  employee_max: 0.03, match_rate: 1.0 },
                    MatchTier { employee_min: 0.03, employee_max: 0.05, match_rate: 0.5 },
                ],
            },
        };

        let voluntary_plan = PlanRules {
            plan_design_id:             "voluntary_only".into(),
            minimum_service_months:     12,
            entry_date_policy:          EntryDatePolicy::Quarterly,
            minimum_hours:              1000.0,
            excluded_classes:           vec![
                ExclusionClass::NonresidentAlien,
                ExclusionClass::UnionCode("LOCAL-77".into()),
            ],
            auto_enrollment: AutoEnrollmentConfig {
                enabled:      false,
                default_rate: 0.0,
                window_days:  0,
                scope:        AutoEnrollmentScope::NewHiresOnly,
                opt_out_rate: 0.0,
            },
            deferral_escalation: DeferralEscalationConfig::default(),
            ..auto_plan.clone()
        };

        let level = |level: u8, label: &str, min: f64, max: f64, w: f64, term: f64, promo: f64| LevelConfig {
            level,
            label: label.into(),
            compensation_min: min,
            compensation_max: max,
            hire_weight: w,
            termination_rate: term,
            promotion_rate: promo,
        };

        let workforce = WorkforceConfig {
            initial_headcount:           50,
            census_max_tenure_years:     15,
            census_participation_rate:   0.55,
            target_growth_rate:          0.03,
            termination_rate_multiplier: 1.0,
            new_hire_termination_rate:   0.20,
            rehire_share:                0.10,
            retirement_age:              65,
            merit_rate:                  0.03,
            cola_rate:                   0.01,
            merit_effective_month:       7,
            merit_effective_day:         1,
            promotion_increase_pct:      0.12,
            promotion_rate_multiplier:   1.0,
            hire_age_min:                22,
            hire_age_max:                55,
            part_time_share:             0.15,
            full_time_weekly_hours:      40.0,
            part_time_weekly_hours:      18.0,
            locations:                   vec!["HQ".into(), "EAST".into(), "WEST".into()],
            divisions:                   vec!["OPS".into(), "ENG".into(), "SALES".into()],
            levels: vec![
                level(1, "Associate", 42_000.0, 60_000.0, 0.50, 0.16, 0.10),
                level(2, "Professional", 60_000.0, 90_000.0, 0.30, 0.12, 0.08),
                level(3, "Senior", 90_000.0, 130_000.0, 0.15, 0.10, 0.05),
                level(4, "Manager", 130_000.0, 190_000.0, 0.04, 0.08, 0.03),
                level(5, "Executive", 190_000.0, 320_000.0, 0.01, 0.06, 0.00),
            ],
        };

        let enrollment_model = EnrollmentModelConfig {
            base_probability: 0.60,
            age_segments: vec![
                AgeSegment { name: "young".into(),     max_age: 30,  probability_multiplier: 0.75, rate_shift: -0.01 },
                AgeSegment { name: "mid_career".into(), max_age: 45, probability_multiplier: 1.00, rate_shift: 0.0 },
                AgeSegment { name: "mature".into(),    max_age: 55,  probability_multiplier: 1.15, rate_shift: 0.01 },
                AgeSegment { name: "senior".into(),    max_age: 200, probability_multiplier: 1.25, rate_shift: 0.02 },
            ],
            income_segments: vec![
                IncomeSegment { name: "low".into(),       max_compensation: Some(50_000.0),  probability_multiplier: 0.80 },
                IncomeSegment { name: "moderate".into(),  max_compensation: Some(100_000.0), probability_multiplier: 1.00 },
                IncomeSegment { name: "high".into(),      max_compensation: Some(180_000.0), probability_multiplier: 1.15 },
                IncomeSegment { name: "executive".into(), max_compensation: None,            probability_multiplier: 1.30 },
            ],
            rate_options: vec![
                RateOption { rate: 0.03, weight: 0.25 },
                RateOption { rate: 0.04, weight: 0.15 },
                RateOption { rate: 0.06, weight: 0.30 },
                RateOption { rate: 0.08, weight: 0.15 },
                RateOption { rate: 0.10, weight: 0.15 },
            ],
            match_bias:                  0.40,
            pre_auto_voluntary_share:    0.35,
            voluntary_conversion_rate:   0.05,
            opt_out_window_days:         90,
            voluntary_election_lag_days: 60,
        };

        let scenario = |id: &str, plan: &str| Scenario {
            scenario_id:         id.into(),
            plan_design_id:      plan.into(),
            random_seed:         42,
            start_year:          2025,
            horizon_years:       3,
            parameter_overrides: ParameterOverrides::default(),
        };

        Self {
            plan_designs: [auto_plan, voluntary_plan]
                .into_iter()
                .map(|p| (p.plan_design_id.clone(), p))
                .collect(),
            workforce,
            enrollment_model,
            scenarios: [scenario("baseline", "standard_ae"), scenario("no_auto", "voluntary_only")]
                .into_iter()
                .map(|s| (s.scenario_id.clone(), s))
                .collect(),
            census: None,
            max_generation_retries: DEFAULT_GENERATION_RETRIES,
        }
    }
}
