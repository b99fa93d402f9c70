//! Process-wide simulation configuration.
//!
//! A `SimulationConfig` is loaded once when a round set starts and stays
//! read-only for every round in that set.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cash a newly registered airline starts with (currency units).
    pub starting_cash: f64,
    pub default_plan_policy: DefaultPlanPolicy,
    pub validation_rules: ValidationRules,
    pub market: MarketConfig,
    pub scoring: ScoringWeights,
    pub engine: EngineConfig,
    pub event_catalog: Vec<EventSpec>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_cash: 1_000_000.0,
            default_plan_policy: DefaultPlanPolicy::default(),
            validation_rules: ValidationRules::default(),
            market: MarketConfig::default(),
            scoring: ScoringWeights::default(),
            engine: EngineConfig::default(),
            event_catalog: default_event_catalog(),
        }
    }
}

/// What a team that missed the deadline gets instead of a plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPlanPolicy {
    /// No actions.
    #[default]
    Empty,
    /// Re-submit the actions approved in the team's previous round.
    RepeatPrevious,
}

impl DefaultPlanPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::RepeatPrevious => "repeat_previous",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationRules {
    pub max_fleet_size: u32,
    pub routes_per_aircraft: u32,
    pub seats_per_aircraft: u32,
    pub max_campaigns_per_round: u32,
    pub max_trainings_per_round: u32,
    pub max_maintenance_level: u32,
    pub staff_training_reputation_gain: f64,
    pub maintenance_reputation_gain: f64,
    /// Cap the plan's budget at the claimed total instead of available cash only.
    pub enforce_budget_claim: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_fleet_size: 50,
            routes_per_aircraft: 1,
            seats_per_aircraft: 180,
            max_campaigns_per_round: 3,
            max_trainings_per_round: 2,
            max_maintenance_level: 5,
            staff_training_reputation_gain: 1.5,
            maintenance_reputation_gain: 1.0,
            enforce_budget_claim: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub base_passengers: u64,
    pub min_passengers: u64,
    pub max_passengers: u64,
    /// Total fleet size at which competition intensity saturates at 1.0.
    pub competition_saturation_fleet: u32,
    /// Reputation points drifted back toward 50 every round.
    pub reputation_decay: f64,
    /// Probability of sampling a second event after the first.
    pub second_event_probability: f64,
    /// Charge per aircraft for an `operating_cost` event of magnitude 1.0.
    pub operating_cost_per_aircraft: f64,
    pub share_weights: ShareWeights,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_passengers: 1_000_000,
            min_passengers: 800_000,
            max_passengers: 1_500_000,
            competition_saturation_fleet: 20,
            reputation_decay: 1.0,
            second_event_probability: 0.35,
            operating_cost_per_aircraft: 10_000.0,
            share_weights: ShareWeights::default(),
        }
    }
}

/// Weights of the market-share formula.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareWeights {
    pub capacity: f64,
    pub reputation: f64,
    pub route_coverage: f64,
}

impl Default for ShareWeights {
    fn default() -> Self {
        Self {
            capacity: 0.5,
            reputation: 0.3,
            route_coverage: 0.2,
        }
    }
}

/// Weights of the evaluation rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub approval: f64,
    pub budget_utilization: f64,
    pub capacity_growth: f64,
    pub market_share: f64,
    /// How strongly a market-share change moves its metric away from 0.5.
    pub share_sensitivity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            approval: 0.35,
            budget_utilization: 0.25,
            capacity_growth: 0.2,
            market_share: 0.2,
            share_sensitivity: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Base seed mixed with the round id for event sampling.
    pub seed: u64,
    /// Hard ceiling for all team pipelines to reach the barrier.
    pub barrier_ceiling_ms: u64,
    pub advisory_timeout_ms: u64,
    /// Minimum confidence for an implausible verdict to become a feedback note.
    pub advisory_note_threshold: f64,
    /// Attempts for version-checked writes before giving up.
    pub max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            barrier_ceiling_ms: 30_000,
            advisory_timeout_ms: 2_000,
            advisory_note_threshold: 0.7,
            max_write_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Economic,
    Competition,
    Operational,
}

/// What a market event acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventEffect {
    /// Total passengers scale by `1 + magnitude`.
    Demand,
    /// Every airline's reputation moves by `magnitude * 10` points.
    Reputation,
    /// Effective capacity scales by `1 + magnitude` for this round's shares.
    Capacity,
    /// Each aircraft costs `magnitude * operating_cost_per_aircraft`.
    OperatingCost,
}

/// One entry of the event catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSpec {
    pub id: String,
    pub description: String,
    pub category: EventCategory,
    pub probability: f64,
    pub magnitude: f64,
    pub effect: EventEffect,
}

impl EventSpec {
    fn new(
        id: &str,
        description: &str,
        category: EventCategory,
        probability: f64,
        magnitude: f64,
        effect: EventEffect,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            probability,
            magnitude,
            effect,
        }
    }
}

/// The stock catalog: five economic, five competition and five operational
/// events.
pub fn default_event_catalog() -> Vec<EventSpec> {
    use EventCategory::*;
    use EventEffect::*;

    vec![
        EventSpec::new("fuel_price_spike", "Fuel prices increased by 15% due to geopolitical tensions", Economic, 0.06, 0.15, OperatingCost),
        EventSpec::new("tourism_boom", "Tourism boom increases passenger demand by 20%", Economic, 0.06, 0.20, Demand),
        EventSpec::new("recession", "Economic recession reduces business travel by 25%", Economic, 0.06, -0.25, Demand),
        EventSpec::new("new_airport", "New airport opens, creating expansion opportunities", Economic, 0.06, 0.10, Demand),
        EventSpec::new("aviation_tax", "Government introduces new aviation taxes", Economic, 0.06, 0.10, OperatingCost),
        EventSpec::new("low_cost_entrant", "New low-cost carrier enters the market", Competition, 0.05, -0.10, Demand),
        EventSpec::new("competitor_bankruptcy", "Major competitor files for bankruptcy", Competition, 0.05, 0.15, Demand),
        EventSpec::new("alliance_formed", "International airline alliance forms", Competition, 0.05, 0.20, Reputation),
        EventSpec::new("price_war", "Price war initiated by market leader", Competition, 0.05, -0.20, Reputation),
        EventSpec::new("route_restrictions", "New regulatory restrictions on routes", Competition, 0.05, -0.10, Capacity),
        EventSpec::new("atc_strike", "Air traffic control strikes cause delays", Operational, 0.04, -0.30, Reputation),
        EventSpec::new("weather_disruption", "Weather disruptions affect 30% of flights", Operational, 0.04, -0.30, Capacity),
        EventSpec::new("safety_regulation", "New safety regulations require aircraft modifications", Operational, 0.04, 0.20, OperatingCost),
        EventSpec::new("pilot_shortage", "Pilot shortage affects industry capacity", Operational, 0.04, -0.15, Capacity),
        EventSpec::new("technology_upgrade", "Technology upgrade improves efficiency", Operational, 0.04, 0.10, Capacity),
    ]
}

impl SimulationConfig {
    /// Reject configurations that would make a round ill-defined.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: String| Err(CoreError::InvalidConfig(msg));

        if !self.starting_cash.is_finite() || self.starting_cash < 0.0 {
            return invalid(format!("starting_cash must be >= 0, got {}", self.starting_cash));
        }
        if self.validation_rules.routes_per_aircraft == 0 {
            return invalid("routes_per_aircraft must be at least 1".to_string());
        }
        if self.market.min_passengers > self.market.max_passengers {
            return invalid("min_passengers exceeds max_passengers".to_string());
        }
        if !(0.0..=1.0).contains(&self.market.second_event_probability) {
            return invalid("second_event_probability must be within [0, 1]".to_string());
        }

        let w = &self.market.share_weights;
        if [w.capacity, w.reputation, w.route_coverage]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.capacity + w.reputation + w.route_coverage <= 0.0
        {
            return invalid("share_weights must be non-negative with a positive sum".to_string());
        }

        let s = &self.scoring;
        if [s.approval, s.budget_utilization, s.capacity_growth, s.market_share]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || s.approval + s.budget_utilization + s.capacity_growth + s.market_share <= 0.0
        {
            return invalid("scoring weights must be non-negative with a positive sum".to_string());
        }

        if self.engine.max_write_attempts == 0 {
            return invalid("max_write_attempts must be at least 1".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for event in &self.event_catalog {
            if !(0.0..=1.0).contains(&event.probability) {
                return invalid(format!(
                    "event {} has probability {} outside [0, 1]",
                    event.id, event.probability
                ));
            }
            if !event.magnitude.is_finite() {
                return invalid(format!("event {} has a non-finite magnitude", event.id));
            }
            if !seen.insert(event.id.as_str()) {
                return invalid(format!("duplicate event id {}", event.id));
            }
        }

        Ok(())
    }
}
