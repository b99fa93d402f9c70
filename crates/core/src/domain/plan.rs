use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::action::{Action, ActionType};
use super::ids::{validate_id, RoundId, TeamId};
use crate::error::CoreError;
use crate::money::Money;

/// A team's intended actions for one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemesterPlan {
    pub team_id: TeamId,
    pub round_id: RoundId,
    pub actions: Vec<Action>,
    pub total_budget_claim: Money,
    pub submitted_at: DateTime<Utc>,
}

impl SemesterPlan {
    pub fn new(team_id: impl Into<TeamId>, round_id: impl Into<RoundId>, actions: Vec<Action>) -> Self {
        let total_budget_claim = actions.iter().map(|a| a.cost).sum();
        Self {
            team_id: team_id.into(),
            round_id: round_id.into(),
            actions,
            total_budget_claim,
            submitted_at: Utc::now(),
        }
    }

    /// Plan with no actions, used for the `empty` default policy.
    pub fn empty(team_id: impl Into<TeamId>, round_id: impl Into<RoundId>) -> Self {
        Self::new(team_id, round_id, Vec::new())
    }

    pub fn with_budget_claim(mut self, claim: Money) -> Self {
        self.total_budget_claim = claim;
        self
    }

    pub fn total_cost(&self) -> Money {
        self.actions.iter().map(|a| a.cost).sum()
    }
}

/// Plan submission as exchanged with the collecting UI.
///
/// `semester` names the round the plan is meant for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPayload {
    pub team_id: String,
    pub semester: String,
    pub total_budget: f64,
    pub actions: Vec<PlanActionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanActionPayload {
    pub action_type: String,
    #[serde(default)]
    pub description: String,
    pub cost: f64,
    #[serde(default)]
    pub parameters: Value,
}

impl PlanPayload {
    /// Parse a raw JSON document. Any structural problem is a schema error.
    pub fn from_json(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value).map_err(|e| CoreError::schema(e.to_string()))
    }

    /// Convert into a domain plan, rejecting malformed payloads up front.
    pub fn into_plan(self, submitted_at: DateTime<Utc>) -> Result<SemesterPlan, CoreError> {
        validate_id(&self.team_id).map_err(|e| CoreError::schema(e.to_string()))?;
        validate_id(&self.semester).map_err(|e| CoreError::schema(e.to_string()))?;

        let total_budget_claim = Money::from_float(self.total_budget)
            .filter(|m| !m.is_negative())
            .ok_or_else(|| {
                CoreError::schema(format!(
                    "total_budget must be a non-negative number, got {}",
                    self.total_budget
                ))
            })?;

        let actions = self
            .actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| action.into_action(index))
            .collect::<Result<Vec<_>, _>>()?;

        if Money::checked_sum(actions.iter().map(|a| a.cost)).is_none() {
            return Err(CoreError::schema(
                "sum of action costs exceeds the representable amount",
            ));
        }

        Ok(SemesterPlan {
            team_id: self.team_id,
            round_id: self.semester,
            actions,
            total_budget_claim,
            submitted_at,
        })
    }
}

impl PlanActionPayload {
    fn into_action(self, index: usize) -> Result<Action, CoreError> {
        let action_type = ActionType::parse(&self.action_type).ok_or_else(|| {
            CoreError::schema(format!(
                "actions[{}]: unknown action_type {:?}",
                index, self.action_type
            ))
        })?;

        let cost = Money::from_float(self.cost)
            .filter(|m| !m.is_negative())
            .ok_or_else(|| {
                CoreError::schema(format!(
                    "actions[{}]: cost must be a non-negative number, got {}",
                    index, self.cost
                ))
            })?;

        let parameters = match self.parameters {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(CoreError::schema(format!(
                    "actions[{}]: parameters must be an object, got {}",
                    index, other
                )))
            }
        };

        Ok(Action {
            action_type,
            description: self.description,
            cost,
            parameters,
        })
    }
}
