//! Class-wide overview of the simulation.

use airline_core::{
    EvaluationRecord, Ledger, MarketState, Money, Round, RoundStatus, SemesterPlan, TeamId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSummary {
    pub team_id: TeamId,
    pub name: String,
    pub cash: Money,
    pub fleet_size: u32,
    pub route_count: usize,
    pub reputation: f64,
    pub market_share: f64,
    /// Score of the team's most recent evaluation.
    pub latest_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TopPerformers {
    pub market_leader: Option<TeamId>,
    pub highest_reputation: Option<TeamId>,
    pub most_cash: Option<TeamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClassAverages {
    pub cash: f64,
    pub fleet_size: f64,
    pub reputation: f64,
    pub market_share: f64,
    pub latest_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationStatus {
    pub round_set_id: Uuid,
    pub teams: Vec<TeamSummary>,
    pub market: MarketState,
    pub active_round: Option<Round>,
    pub rounds_closed: usize,
    pub top_performers: TopPerformers,
    pub class_averages: ClassAverages,
}

impl SimulationStatus {
    pub fn build(
        round_set_id: Uuid,
        ledgers: &[Ledger],
        market: MarketState,
        rounds: &[Round],
        evaluations: &[EvaluationRecord],
    ) -> Self {
        let mut latest: BTreeMap<&str, &EvaluationRecord> = BTreeMap::new();
        for record in evaluations {
            let newer = latest
                .get(record.team_id.as_str())
                .map_or(true, |current| record.created_at >= current.created_at);
            if newer {
                latest.insert(record.team_id.as_str(), record);
            }
        }

        let teams: Vec<TeamSummary> = ledgers
            .iter()
            .map(|l| TeamSummary {
                team_id: l.team_id.clone(),
                name: l.name.clone(),
                cash: l.cash,
                fleet_size: l.fleet_size,
                route_count: l.routes.len(),
                reputation: l.reputation,
                // the market's snapshot also covers teams whose ledger sat a round out
                market_share: market
                    .competitor_snapshot
                    .get(&l.team_id)
                    .map_or(l.market_share, |m| m.market_share),
                latest_score: latest.get(l.team_id.as_str()).map(|r| r.score),
            })
            .collect();

        Self {
            round_set_id,
            top_performers: top_performers(&teams),
            class_averages: class_averages(&teams),
            teams,
            market,
            active_round: rounds.iter().find(|r| !r.status.is_terminal()).cloned(),
            rounds_closed: rounds
                .iter()
                .filter(|r| r.status == RoundStatus::Closed)
                .count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmittedPlan {
    pub team_id: TeamId,
    pub action_count: usize,
    pub total_cost: Money,
    pub total_budget_claim: Money,
    pub submitted_at: DateTime<Utc>,
}

/// Plan intake of one round: who has handed in a plan and who has not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSubmissions {
    pub round_id: String,
    pub status: RoundStatus,
    pub deadline: DateTime<Utc>,
    pub intake_open: bool,
    pub submitted: Vec<SubmittedPlan>,
    pub missing: Vec<TeamId>,
}

impl RoundSubmissions {
    pub fn build(round: &Round, plans: &[SemesterPlan], now: DateTime<Utc>) -> Self {
        let mut submitted: Vec<SubmittedPlan> = plans
            .iter()
            .filter(|p| p.round_id == round.round_id && round.participants.contains(&p.team_id))
            .map(|p| SubmittedPlan {
                team_id: p.team_id.clone(),
                action_count: p.actions.len(),
                total_cost: p.total_cost(),
                total_budget_claim: p.total_budget_claim,
                submitted_at: p.submitted_at,
            })
            .collect();
        submitted.sort_by(|a, b| a.team_id.cmp(&b.team_id));

        let missing = round
            .participants
            .iter()
            .filter(|team| !submitted.iter().any(|s| &s.team_id == *team))
            .cloned()
            .collect();

        Self {
            round_id: round.round_id.clone(),
            status: round.status,
            deadline: round.deadline,
            intake_open: round.intake_open(now),
            submitted,
            missing,
        }
    }
}

fn leader_by<F>(teams: &[TeamSummary], key: F) -> Option<TeamId>
where
    F: Fn(&TeamSummary) -> f64,
{
    teams
        .iter()
        .max_by(|a, b| key(a).total_cmp(&key(b)).then_with(|| b.team_id.cmp(&a.team_id)))
        .map(|t| t.team_id.clone())
}

fn top_performers(teams: &[TeamSummary]) -> TopPerformers {
    TopPerformers {
        market_leader: leader_by(teams, |t| t.market_share),
        highest_reputation: leader_by(teams, |t| t.reputation),
        most_cash: leader_by(teams, |t| t.cash.to_float()),
    }
}

fn class_averages(teams: &[TeamSummary]) -> ClassAverages {
    if teams.is_empty() {
        return ClassAverages::default();
    }
    let n = teams.len() as f64;
    let scores: Vec<f64> = teams.iter().filter_map(|t| t.latest_score).collect();

    ClassAverages {
        cash: teams.iter().map(|t| t.cash.to_float()).sum::<f64>() / n,
        fleet_size: teams.iter().map(|t| t.fleet_size as f64).sum::<f64>() / n,
        reputation: teams.iter().map(|t| t.reputation).sum::<f64>() / n,
        market_share: teams.iter().map(|t| t.market_share).sum::<f64>() / n,
        latest_score: (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64),
    }
}
