use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{RoundId, TeamId};
use crate::config::ValidationRules;
use crate::money::Money;

pub const MIN_REPUTATION: f64 = 0.0;
pub const MAX_REPUTATION: f64 = 100.0;
pub const NEUTRAL_REPUTATION: f64 = 50.0;

/// Capacity derived from the fleet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CapacityLimits {
    /// Routes the fleet can serve.
    pub route_slots: u32,
    /// Seats per round across the fleet.
    pub seat_capacity: u64,
}

impl CapacityLimits {
    pub fn for_fleet(fleet_size: u32, rules: &ValidationRules) -> Self {
        Self {
            route_slots: fleet_size.saturating_mul(rules.routes_per_aircraft),
            seat_capacity: fleet_size as u64 * rules.seats_per_aircraft as u64,
        }
    }
}

/// Authoritative financial and operational state of one airline.
///
/// Only the action executor and the market update mutate a ledger, and every
/// committed mutation bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    pub team_id: TeamId,
    pub name: String,
    pub cash: Money,
    pub fleet_size: u32,
    pub routes: BTreeSet<String>,
    pub reputation: f64,
    pub staff_level: u32,
    pub maintenance_level: u32,
    pub capacity: CapacityLimits,
    pub market_share: f64,
    /// Last round whose executed actions were committed to this ledger.
    #[serde(default)]
    pub settled_round: Option<RoundId>,
    /// Last round whose market adjustment was applied.
    #[serde(default)]
    pub market_round: Option<RoundId>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    /// Starting state for a newly registered airline.
    pub fn new(team_id: impl Into<TeamId>, name: impl Into<String>, cash: Money) -> Self {
        Self {
            team_id: team_id.into(),
            name: name.into(),
            cash,
            fleet_size: 0,
            routes: BTreeSet::new(),
            reputation: NEUTRAL_REPUTATION,
            staff_level: 0,
            maintenance_level: 0,
            capacity: CapacityLimits::default(),
            market_share: 0.0,
            settled_round: None,
            market_round: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn with_fleet(mut self, fleet_size: u32, rules: &ValidationRules) -> Self {
        self.fleet_size = fleet_size;
        self.recompute_capacity(rules);
        self
    }

    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes = routes.into_iter().map(Into::into).collect();
        self
    }

    pub fn recompute_capacity(&mut self, rules: &ValidationRules) {
        self.capacity = CapacityLimits::for_fleet(self.fleet_size, rules);
    }

    pub fn adjust_reputation(&mut self, delta: f64) {
        self.reputation = (self.reputation + delta).clamp(MIN_REPUTATION, MAX_REPUTATION);
    }

    /// Record a committed mutation.
    pub fn bump_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn is_settled_for(&self, round_id: &str) -> bool {
        self.settled_round.as_deref() == Some(round_id)
    }

    pub fn has_market_adjustment_for(&self, round_id: &str) -> bool {
        self.market_round.as_deref() == Some(round_id)
    }

    /// Apply the market's cross-cutting effects for one round.
    pub fn apply_market_adjustment(&mut self, adjustment: &LedgerAdjustment) {
        self.adjust_reputation(adjustment.reputation_delta);
        self.cash = self.cash.saturating_sub_to_zero(adjustment.cash_charge);
        self.market_share = adjustment.market_share;
        self.market_round = Some(adjustment.round_id.clone());
        self.bump_version();
    }

    pub fn public_metrics(&self) -> CompetitorMetrics {
        CompetitorMetrics {
            market_share: self.market_share,
            fleet_size: self.fleet_size,
            route_count: self.routes.len() as u32,
            reputation: self.reputation,
        }
    }
}

/// Per-team effect of a market update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerAdjustment {
    pub team_id: TeamId,
    pub round_id: RoundId,
    pub reputation_delta: f64,
    pub cash_charge: Money,
    pub market_share: f64,
}

/// Public, world-readable summary of an airline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitorMetrics {
    pub market_share: f64,
    pub fleet_size: u32,
    pub route_count: u32,
    pub reputation: f64,
}

/// Before/after difference of a ledger over one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LedgerDelta {
    pub cash_delta: Money,
    pub fleet_delta: i64,
    pub routes_added: Vec<String>,
    pub reputation_delta: f64,
    pub market_share_delta: f64,
    pub seat_capacity_delta: i64,
}

impl LedgerDelta {
    pub fn between(before: &Ledger, after: &Ledger) -> Self {
        Self {
            cash_delta: after.cash - before.cash,
            fleet_delta: after.fleet_size as i64 - before.fleet_size as i64,
            routes_added: after.routes.difference(&before.routes).cloned().collect(),
            reputation_delta: after.reputation - before.reputation,
            market_share_delta: after.market_share - before.market_share,
            seat_capacity_delta: after.capacity.seat_capacity as i64
                - before.capacity.seat_capacity as i64,
        }
    }
}
