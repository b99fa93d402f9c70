use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ApprovedAction, RejectedAction};
use super::ids::{RoundId, TeamId};
use super::ledger::LedgerDelta;
use super::round::PlanSource;

/// A rejected action the team should think about again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconsiderItem {
    pub index: usize,
    pub action: Action,
    /// Rejection tag, e.g. `BudgetExceeded`.
    pub reason: String,
    pub detail: String,
}

impl From<&RejectedAction> for ReconsiderItem {
    fn from(rejected: &RejectedAction) -> Self {
        Self {
            index: rejected.index,
            action: rejected.action.clone(),
            reason: rejected.reason.tag().to_string(),
            detail: rejected.reason.describe(),
        }
    }
}

/// Scored result of one team's round. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    pub team_id: TeamId,
    pub round_id: RoundId,
    pub score: f64,
    pub feedback_text: String,
    pub ledger_delta: LedgerDelta,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub reconsider: Vec<ReconsiderItem>,
    pub approved_actions: Vec<ApprovedAction>,
    pub rejected_actions: Vec<RejectedAction>,
    pub plan_source: PlanSource,
    pub created_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Share of planned actions that were applied. An empty plan scores 0.
    pub fn approval_rate(&self) -> f64 {
        let total = self.approved_actions.len() + self.rejected_actions.len();
        if total == 0 {
            return 0.0;
        }
        self.approved_actions.len() as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{ActionType, RejectionReason};
    use crate::money::Money;

    #[test]
    fn test_reconsider_from_rejection() {
        let rejected = RejectedAction {
            index: 2,
            action: Action::new(ActionType::AddRoute, "route", Money::from_units(50_000)),
            reason: RejectionReason::CapacityExceeded {
                detail: "no free route slot".to_string(),
            },
        };
        let item = ReconsiderItem::from(&rejected);
        assert_eq!(item.index, 2);
        assert_eq!(item.reason, "CapacityExceeded");
        assert_eq!(item.detail, "no free route slot");
    }

    #[test]
    fn test_empty_plan_approval_rate() {
        let record = EvaluationRecord {
            team_id: "T1".to_string(),
            round_id: "R1".to_string(),
            score: 50.0,
            feedback_text: String::new(),
            ledger_delta: LedgerDelta::default(),
            strengths: vec![],
            improvement_areas: vec![],
            reconsider: vec![],
            approved_actions: vec![],
            rejected_actions: vec![],
            plan_source: PlanSource::Submitted,
            created_at: Utc::now(),
        };
        assert_eq!(record.approval_rate(), 0.0);
    }
}
