use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::{ApprovedAction, RejectedAction};
use super::ids::TeamId;
use super::ledger::Ledger;
use super::plan::SemesterPlan;
use super::round::{PlanSource, RoundIncident};
use crate::money::Money;

/// One team's outcome of a round, from the barrier onwards.
///
/// Stored with the round once the barrier releases, so a round that fails
/// after committing ledgers can be carried to `closed` later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSettlement {
    pub team_id: TeamId,
    pub plan: SemesterPlan,
    pub plan_source: PlanSource,
    /// Ledger the pipeline started from.
    pub before: Ledger,
    /// Ledger after execution; committed once the round settles.
    pub staged: Ledger,
    pub approved: Vec<ApprovedAction>,
    /// Rejected by validation or dropped at execution.
    pub rejected: Vec<RejectedAction>,
    pub cash_spent: Money,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub advisory_notes: Vec<AdvisoryNote>,
    #[serde(default)]
    pub incidents: Vec<RoundIncident>,
}

/// An advisor remark about one approved action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvisoryNote {
    pub action_index: usize,
    pub message: String,
}

impl fmt::Display for AdvisoryNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action #{} {}", self.action_index, self.message)
    }
}

impl TeamSettlement {
    /// No-op result standing in for a pipeline that failed.
    pub fn substituted(plan: SemesterPlan, ledger: Ledger, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            team_id: ledger.team_id.clone(),
            incidents: vec![RoundIncident::PipelineFailure {
                team_id: ledger.team_id.clone(),
                reason: reason.clone(),
            }],
            plan,
            plan_source: PlanSource::Substituted { reason },
            staged: ledger.clone(),
            before: ledger,
            approved: Vec::new(),
            rejected: Vec::new(),
            cash_spent: Money::ZERO,
            warnings: Vec::new(),
            advisory_notes: Vec::new(),
        }
    }

    pub fn is_substituted(&self) -> bool {
        matches!(self.plan_source, PlanSource::Substituted { .. })
    }

    /// Whether committing `staged` changes anything.
    pub fn has_changes(&self) -> bool {
        !self.approved.is_empty()
    }

    /// A team that missed the deadline and ended up doing nothing. Its
    /// ledger is left exactly as it was.
    pub fn is_idle_default(&self) -> bool {
        matches!(self.plan_source, PlanSource::Default { .. }) && self.approved.is_empty()
    }
}
