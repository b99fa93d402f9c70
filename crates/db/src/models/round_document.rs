use airline_core::{MarketState, Round, TeamId, TeamSettlement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stored shape of `simulation/{round_id}`: the round, the per-team
/// settlements once the barrier has released, and the market it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundDocument {
    pub round: Round,
    #[serde(default)]
    pub settlements: BTreeMap<TeamId, TeamSettlement>,
    #[serde(default)]
    pub market: Option<MarketState>,
}

impl RoundDocument {
    pub fn new(round: Round) -> Self {
        Self {
            round,
            settlements: BTreeMap::new(),
            market: None,
        }
    }
}
