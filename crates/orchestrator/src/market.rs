//! Market update.
//!
//! Runs once per round, after every team's pipeline has landed. Samples the
//! round's events, recomputes market shares and the shared market state, and
//! returns the per-team ledger adjustments to apply.

use airline_core::{
    AppliedEvent, CompetitorMetrics, EconomicConditions, EventEffect, EventSpec, Ledger,
    LedgerAdjustment, MarketState, Money, SimulationConfig, NEUTRAL_REPUTATION,
};
use chrono::Utc;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};

const SHARE_TOLERANCE: f64 = 1e-9;
const DEMAND_FLUCTUATION: f64 = 0.05;
const COMPETITION_DEMAND_FACTOR: f64 = 0.2;
const REPUTATION_DEMAND_FACTOR: f64 = 0.1;
/// Reputation points per unit of a `reputation` event's magnitude.
const REPUTATION_EVENT_SCALE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketUpdate {
    pub state: MarketState,
    pub adjustments: Vec<LedgerAdjustment>,
    pub events: Vec<AppliedEvent>,
}

/// Combined effect of the sampled events.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EventEffects {
    demand_multiplier: f64,
    reputation_shift: f64,
    capacity_multiplier: f64,
    operating_cost_rate: f64,
}

impl EventEffects {
    fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (EventEffect, f64)>,
    {
        let mut effects = Self {
            demand_multiplier: 1.0,
            reputation_shift: 0.0,
            capacity_multiplier: 1.0,
            operating_cost_rate: 0.0,
        };
        for (effect, magnitude) in events {
            match effect {
                EventEffect::Demand => effects.demand_multiplier *= 1.0 + magnitude,
                EventEffect::Reputation => effects.reputation_shift += magnitude * REPUTATION_EVENT_SCALE,
                EventEffect::Capacity => effects.capacity_multiplier *= 1.0 + magnitude,
                EventEffect::OperatingCost => effects.operating_cost_rate += magnitude,
            }
        }
        effects.demand_multiplier = effects.demand_multiplier.max(0.0);
        effects.capacity_multiplier = effects.capacity_multiplier.max(0.0);
        effects.operating_cost_rate = effects.operating_cost_rate.max(0.0);
        effects
    }
}

pub struct MarketUpdateEngine;

impl MarketUpdateEngine {
    /// Deterministic for a given round id, prior state, ledgers and config.
    pub fn compute(
        round_id: &str,
        prior: &MarketState,
        ledgers: &[Ledger],
        config: &SimulationConfig,
    ) -> Result<MarketUpdate> {
        let market = &config.market;
        let mut rng = round_rng(config.engine.seed, round_id);

        let sampled = sample_events(&mut rng, &config.event_catalog, market.second_event_probability);
        let effects = EventEffects::from_events(sampled.iter().map(|e| (e.effect, e.magnitude)));

        let mut ledgers: Vec<&Ledger> = ledgers.iter().collect();
        ledgers.sort_by(|a, b| a.team_id.cmp(&b.team_id));

        let reputations: Vec<f64> = ledgers
            .iter()
            .map(|l| decay_toward_neutral(clamp_reputation(l.reputation + effects.reputation_shift), market.reputation_decay))
            .collect();
        let capacities: Vec<f64> = ledgers
            .iter()
            .map(|l| l.capacity.seat_capacity as f64 * effects.capacity_multiplier)
            .collect();
        let routes: Vec<f64> = ledgers.iter().map(|l| l.routes.len() as f64).collect();

        let shares = market_shares(&capacities, &reputations, &routes, config)?;

        let mut snapshot = BTreeMap::new();
        for (i, ledger) in ledgers.iter().enumerate() {
            snapshot.insert(
                ledger.team_id.clone(),
                CompetitorMetrics {
                    market_share: shares[i],
                    fleet_size: ledger.fleet_size,
                    route_count: ledger.routes.len() as u32,
                    reputation: reputations[i],
                },
            );
        }

        let total_fleet: u64 = ledgers.iter().map(|l| l.fleet_size as u64).sum();
        let competition_level = if market.competition_saturation_fleet == 0 {
            1.0
        } else {
            (total_fleet as f64 / market.competition_saturation_fleet as f64).min(1.0)
        };

        let average_reputation = if reputations.is_empty() {
            NEUTRAL_REPUTATION
        } else {
            reputations.iter().sum::<f64>() / reputations.len() as f64
        };

        let fluctuation = rng.gen_range(1.0 - DEMAND_FLUCTUATION..=1.0 + DEMAND_FLUCTUATION);
        let demand = market.base_passengers as f64
            * (1.0 + competition_level * COMPETITION_DEMAND_FACTOR)
            * (1.0 + (average_reputation - NEUTRAL_REPUTATION) / 100.0 * REPUTATION_DEMAND_FACTOR)
            * fluctuation
            * effects.demand_multiplier;
        let total_passengers =
            (demand.round().max(0.0) as u64).clamp(market.min_passengers, market.max_passengers);

        let events: Vec<AppliedEvent> = sampled
            .iter()
            .map(|e| AppliedEvent {
                round_id: round_id.to_string(),
                event_id: e.id.clone(),
                description: e.description.clone(),
                category: e.category,
                effect: e.effect,
                magnitude: e.magnitude,
            })
            .collect();

        let mut scenario_history = prior.scenario_history.clone();
        scenario_history.extend(events.iter().cloned());

        let state = MarketState {
            round_id: Some(round_id.to_string()),
            version: prior.version + 1,
            total_passengers,
            competition_level,
            market_concentration: shares.iter().map(|s| s * s).sum(),
            economic_conditions: economic_conditions(&sampled),
            scenario_history,
            competitor_snapshot: snapshot,
            updated_at: Utc::now(),
        };

        info!(
            round_id = %round_id,
            version = state.version,
            events = ?events.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
            total_passengers = state.total_passengers,
            "Market state computed"
        );

        let adjustments = Self::adjustments(round_id, &state, ledgers.iter().copied(), config);
        Ok(MarketUpdate {
            state,
            adjustments,
            events,
        })
    }

    /// Rebuild the update from a market state that is already committed,
    /// for ledgers the adjustment has not reached yet.
    pub fn from_committed(
        round_id: &str,
        state: MarketState,
        ledgers: &[Ledger],
        config: &SimulationConfig,
    ) -> MarketUpdate {
        let adjustments = Self::adjustments(round_id, &state, ledgers.iter(), config);
        let events = state.events_for_round(round_id).cloned().collect();
        MarketUpdate {
            state,
            adjustments,
            events,
        }
    }

    /// Per-team adjustments implied by a computed market state: move each
    /// ledger to its snapshot reputation and share, and charge the round's
    /// operating costs per aircraft.
    fn adjustments<'a>(
        round_id: &str,
        state: &MarketState,
        ledgers: impl Iterator<Item = &'a Ledger>,
        config: &SimulationConfig,
    ) -> Vec<LedgerAdjustment> {
        let effects = EventEffects::from_events(
            state
                .events_for_round(round_id)
                .map(|e| (e.effect, e.magnitude)),
        );

        ledgers
            .filter_map(|ledger| {
                let metrics = state.competitor_snapshot.get(&ledger.team_id)?;
                let cash_charge = Money::from_float(
                    ledger.fleet_size as f64
                        * effects.operating_cost_rate
                        * config.market.operating_cost_per_aircraft,
                )
                .unwrap_or(Money::ZERO);

                Some(LedgerAdjustment {
                    team_id: ledger.team_id.clone(),
                    round_id: round_id.to_string(),
                    reputation_delta: metrics.reputation - ledger.reputation,
                    cash_charge,
                    market_share: metrics.market_share,
                })
            })
            .collect()
    }
}

/// Seed mixed with an FNV-1a hash of the round id, so every round gets its
/// own reproducible stream.
pub fn round_rng(seed: u64, round_id: &str) -> StdRng {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let hash = round_id.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    });
    StdRng::seed_from_u64(seed ^ hash)
}

/// One event by weighted choice, then a second one with
/// `second_probability`, without replacement.
fn sample_events<'a>(rng: &mut StdRng, catalog: &'a [EventSpec], second_probability: f64) -> Vec<&'a EventSpec> {
    let mut remaining: Vec<&EventSpec> = catalog.iter().collect();
    let mut sampled = Vec::new();

    for draw in 0..2 {
        if draw == 1 && !rng.gen_bool(second_probability.clamp(0.0, 1.0)) {
            break;
        }
        let Ok(dist) = WeightedIndex::new(remaining.iter().map(|e| e.probability)) else {
            debug!("No event with positive probability left to sample");
            break;
        };
        sampled.push(remaining.remove(dist.sample(rng)));
    }

    sampled
}

fn market_shares(
    capacities: &[f64],
    reputations: &[f64],
    routes: &[f64],
    config: &SimulationConfig,
) -> Result<Vec<f64>> {
    let n = capacities.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let w = &config.market.share_weights;
    let weight_sum = w.capacity + w.reputation + w.route_coverage;
    if !(weight_sum > 0.0) {
        return Err(OrchestratorError::MarketInvariant(
            "share weights sum to zero".to_string(),
        ));
    }

    let capacity = normalized(capacities);
    let reputation = normalized(reputations);
    let coverage = normalized(routes);

    let shares: Vec<f64> = (0..n)
        .map(|i| {
            (w.capacity * capacity[i] + w.reputation * reputation[i] + w.route_coverage * coverage[i])
                / weight_sum
        })
        .collect();

    let total: f64 = shares.iter().sum();
    if (total - 1.0).abs() > SHARE_TOLERANCE {
        return Err(OrchestratorError::MarketInvariant(format!(
            "market shares sum to {} instead of 1",
            total
        )));
    }

    Ok(shares)
}

/// Each value's fraction of the total; equal split when the total is zero.
fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![1.0 / values.len() as f64; values.len()]
    }
}

fn clamp_reputation(value: f64) -> f64 {
    value.clamp(airline_core::MIN_REPUTATION, airline_core::MAX_REPUTATION)
}

fn decay_toward_neutral(reputation: f64, decay: f64) -> f64 {
    if reputation > NEUTRAL_REPUTATION {
        (reputation - decay).max(NEUTRAL_REPUTATION)
    } else {
        (reputation + decay).min(NEUTRAL_REPUTATION)
    }
}

fn economic_conditions(events: &[&EventSpec]) -> EconomicConditions {
    let balance: i32 = events
        .iter()
        .filter(|e| e.magnitude != 0.0)
        .map(|e| {
            let favorable = match e.effect {
                EventEffect::OperatingCost => e.magnitude < 0.0,
                _ => e.magnitude > 0.0,
            };
            if favorable {
                1
            } else {
                -1
            }
        })
        .sum();

    match balance {
        b if b > 0 => EconomicConditions::Growing,
        b if b < 0 => EconomicConditions::Declining,
        _ => EconomicConditions::Stable,
    }
}
