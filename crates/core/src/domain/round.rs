use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::ids::{RoundId, TeamId};
use crate::config::DefaultPlanPolicy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    Collecting,
    Validating,
    Executing,
    AwaitingBarrier,
    MarketUpdating,
    Evaluating,
    Closed,
    /// Cancelled before the market update began.
    Aborted,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::AwaitingBarrier => "awaiting_barrier",
            Self::MarketUpdating => "market_updating",
            Self::Evaluating => "evaluating",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collecting" => Some(Self::Collecting),
            "validating" => Some(Self::Validating),
            "executing" => Some(Self::Executing),
            "awaiting_barrier" => Some(Self::AwaitingBarrier),
            "market_updating" => Some(Self::MarketUpdating),
            "evaluating" => Some(Self::Evaluating),
            "closed" => Some(Self::Closed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }

    /// Whether the round may still be cancelled.
    pub fn is_abortable(&self) -> bool {
        matches!(
            self,
            Self::Collecting | Self::Validating | Self::Executing | Self::AwaitingBarrier
        )
    }

    /// Past the barrier but not yet closed. Team ledgers may already be
    /// committed, so the round can only be carried forward.
    pub fn is_settling(&self) -> bool {
        matches!(self, Self::MarketUpdating | Self::Evaluating)
    }
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a team's plan for the round came about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlanSource {
    Submitted,
    /// The team missed the deadline and got the default plan.
    Default { policy: DefaultPlanPolicy },
    /// The team's pipeline failed and its result was replaced by a no-op.
    Substituted { reason: String },
}

/// Something that went wrong in a round and was recovered locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundIncident {
    MissingSubmission {
        team_id: TeamId,
        policy: DefaultPlanPolicy,
    },
    InconsistentExecution {
        team_id: TeamId,
        action_index: usize,
        detail: String,
    },
    AdvisoryTimeout {
        team_id: TeamId,
        action_index: usize,
    },
    PipelineFailure {
        team_id: TeamId,
        reason: String,
    },
    LedgerWriteRetried {
        team_id: TeamId,
        attempts: u32,
    },
}

impl RoundIncident {
    pub fn team_id(&self) -> &str {
        match self {
            Self::MissingSubmission { team_id, .. }
            | Self::InconsistentExecution { team_id, .. }
            | Self::AdvisoryTimeout { team_id, .. }
            | Self::PipelineFailure { team_id, .. }
            | Self::LedgerWriteRetried { team_id, .. } => team_id,
        }
    }
}

/// One simulated period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub round_id: RoundId,
    pub round_set_id: Uuid,
    pub status: RoundStatus,
    pub deadline: DateTime<Utc>,
    /// Teams expected to take part, fixed when the round opens.
    pub participants: BTreeSet<TeamId>,
    pub participant_plans: BTreeMap<TeamId, PlanSource>,
    pub previous_round_id: Option<RoundId>,
    pub incidents: Vec<RoundIncident>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Round {
    pub fn new(
        round_id: impl Into<RoundId>,
        round_set_id: Uuid,
        deadline: DateTime<Utc>,
        participants: BTreeSet<TeamId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            round_id: round_id.into(),
            round_set_id,
            status: RoundStatus::default(),
            deadline,
            participants,
            participant_plans: BTreeMap::new(),
            previous_round_id: None,
            incidents: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_previous_round(mut self, previous: Option<RoundId>) -> Self {
        self.previous_round_id = previous;
        self
    }

    pub fn intake_open(&self, now: DateTime<Utc>) -> bool {
        self.status == RoundStatus::Collecting && now <= self.deadline
    }

    pub fn all_submitted(&self) -> bool {
        self.participants
            .iter()
            .all(|team| self.participant_plans.contains_key(team))
    }

    /// Participants with no submitted plan.
    pub fn missing_teams(&self) -> Vec<TeamId> {
        self.participants
            .iter()
            .filter(|team| !self.participant_plans.contains_key(*team))
            .cloned()
            .collect()
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn round() -> Round {
        Round::new(
            "R1",
            Uuid::new_v4(),
            Utc::now() + Duration::hours(1),
            ["T1".to_string(), "T2".to_string()].into_iter().collect(),
        )
    }

    #[test]
    fn test_round_creation() {
        let round = round();
        assert_eq!(round.status, RoundStatus::Collecting);
        assert_eq!(round.version, 1);
        assert!(round.intake_open(Utc::now()));
        assert!(!round.all_submitted());
        assert_eq!(round.missing_teams(), vec!["T1".to_string(), "T2".to_string()]);
    }

    #[test]
    fn test_intake_closes_after_deadline() {
        let round = round();
        assert!(!round.intake_open(round.deadline + Duration::seconds(1)));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(RoundStatus::AwaitingBarrier.as_str(), "awaiting_barrier");
        assert_eq!(
            RoundStatus::parse("market_updating"),
            Some(RoundStatus::MarketUpdating)
        );
        assert_eq!(RoundStatus::parse("invalid"), None);
        assert_eq!(
            serde_json::to_value(RoundStatus::MarketUpdating).unwrap(),
            "market_updating"
        );
    }

    #[test]
    fn test_abortable_window() {
        assert!(RoundStatus::AwaitingBarrier.is_abortable());
        assert!(!RoundStatus::MarketUpdating.is_abortable());
        assert!(!RoundStatus::Closed.is_abortable());
        assert!(RoundStatus::MarketUpdating.is_settling());
        assert!(RoundStatus::Evaluating.is_settling());
        assert!(!RoundStatus::AwaitingBarrier.is_settling());
    }

    #[test]
    fn test_all_submitted() {
        let mut round = round();
        round
            .participant_plans
            .insert("T1".to_string(), PlanSource::Submitted);
        assert_eq!(round.missing_teams(), vec!["T2".to_string()]);
        round.participant_plans.insert(
            "T2".to_string(),
            PlanSource::Default {
                policy: DefaultPlanPolicy::Empty,
            },
        );
        assert!(round.all_submitted());
    }
}
