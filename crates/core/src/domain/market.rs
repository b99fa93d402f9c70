use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{RoundId, TeamId};
use super::ledger::CompetitorMetrics;
use crate::config::{EventCategory, EventEffect};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EconomicConditions {
    Growing,
    #[default]
    Stable,
    Declining,
}

impl EconomicConditions {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Growing => "growing",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

/// An event that was sampled and applied in a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedEvent {
    pub round_id: RoundId,
    pub event_id: String,
    pub description: String,
    pub category: EventCategory,
    pub effect: EventEffect,
    pub magnitude: f64,
}

/// Shared market state. The only entity that several teams' results touch in
/// the same round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketState {
    /// Round that produced this state; `None` before the first round.
    pub round_id: Option<RoundId>,
    pub version: u64,
    pub total_passengers: u64,
    pub competition_level: f64,
    /// Herfindahl-Hirschman index of market shares.
    pub market_concentration: f64,
    pub economic_conditions: EconomicConditions,
    pub scenario_history: Vec<AppliedEvent>,
    pub competitor_snapshot: BTreeMap<TeamId, CompetitorMetrics>,
    pub updated_at: DateTime<Utc>,
}

impl MarketState {
    /// Market before any round has run.
    pub fn initial(total_passengers: u64) -> Self {
        Self {
            round_id: None,
            version: 0,
            total_passengers,
            competition_level: 0.5,
            market_concentration: 0.0,
            economic_conditions: EconomicConditions::Stable,
            scenario_history: Vec::new(),
            competitor_snapshot: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Events applied in one particular round.
    pub fn events_for_round<'a>(&'a self, round_id: &'a str) -> impl Iterator<Item = &'a AppliedEvent> {
        self.scenario_history
            .iter()
            .filter(move |e| e.round_id == round_id)
    }

    pub fn share_of(&self, team_id: &str) -> f64 {
        self.competitor_snapshot
            .get(team_id)
            .map(|m| m.market_share)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_market() {
        let market = MarketState::initial(1_000_000);
        assert_eq!(market.version, 0);
        assert!(market.round_id.is_none());
        assert_eq!(market.economic_conditions, EconomicConditions::Stable);
        assert_eq!(market.share_of("T1"), 0.0);
    }

    #[test]
    fn test_events_for_round() {
        let mut market = MarketState::initial(1_000_000);
        for round in ["R1", "R2", "R2"] {
            market.scenario_history.push(AppliedEvent {
                round_id: round.to_string(),
                event_id: "tourism_boom".to_string(),
                description: "boom".to_string(),
                category: EventCategory::Economic,
                effect: EventEffect::Demand,
                magnitude: 0.2,
            });
        }
        assert_eq!(market.events_for_round("R2").count(), 2);
        assert_eq!(market.events_for_round("R3").count(), 0);
    }
}
