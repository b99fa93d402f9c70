use airline_core::{
    ActionParameters, ApprovedAction, Ledger, Money, RejectedAction, RejectionReason, ValidationRules,
};
use tracing::{debug, error};

use crate::rules::ProjectedState;

/// Result of applying a team's approved actions to its ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub ledger: Ledger,
    pub applied: Vec<ApprovedAction>,
    /// Actions the re-check refused, tagged `InconsistentExecution`.
    pub dropped: Vec<RejectedAction>,
    pub cash_spent: Money,
}

impl ExecutionOutcome {
    pub fn has_inconsistencies(&self) -> bool {
        !self.dropped.is_empty()
    }
}

pub struct ActionExecutor;

impl ActionExecutor {
    /// Applies approved actions in approval order.
    ///
    /// Every action is re-checked against the ledger as it stands right
    /// before it is applied. An action that no longer fits is dropped and
    /// reported instead of applied, so `cash` never goes negative. The
    /// ledger version is bumped once if anything was applied.
    pub fn execute(ledger: &Ledger, approved: &[ApprovedAction], rules: &ValidationRules) -> ExecutionOutcome {
        let mut next = ledger.clone();
        let mut projected = ProjectedState::from_ledger(ledger);
        let mut applied = Vec::new();
        let mut dropped = Vec::new();
        let mut cash_spent = Money::ZERO;

        for item in approved {
            match Self::recheck(&next, &projected, item, rules) {
                Ok(params) => {
                    next.cash -= item.action.cost;
                    cash_spent += item.action.cost;
                    Self::apply_effect(&mut next, &params, rules);
                    projected.apply(&params);
                    applied.push(item.clone());
                }
                Err(detail) => {
                    error!(
                        team_id = %ledger.team_id,
                        action_index = item.index,
                        action_type = item.action.action_type.as_str(),
                        detail = %detail,
                        "Execution re-check disagrees with validation; dropping action"
                    );
                    dropped.push(RejectedAction {
                        index: item.index,
                        action: item.action.clone(),
                        reason: RejectionReason::InconsistentExecution { detail },
                    });
                }
            }
        }

        if !applied.is_empty() {
            next.recompute_capacity(rules);
            next.bump_version();
        }

        debug!(
            team_id = %ledger.team_id,
            applied = applied.len(),
            dropped = dropped.len(),
            cash_spent = %cash_spent,
            "Actions executed"
        );

        ExecutionOutcome {
            ledger: next,
            applied,
            dropped,
            cash_spent,
        }
    }

    fn recheck(
        ledger: &Ledger,
        projected: &ProjectedState,
        item: &ApprovedAction,
        rules: &ValidationRules,
    ) -> Result<ActionParameters, String> {
        if item.action.cost.is_negative() {
            return Err(format!("negative cost {}", item.action.cost));
        }
        if item.action.cost > ledger.cash {
            return Err(format!(
                "costs {} but only {} cash is left",
                item.action.cost, ledger.cash
            ));
        }
        let params = item.action.parameters()?;
        projected.check_capacity(&params, rules)?;
        projected.check_parameters(&params)?;
        Ok(params)
    }

    fn apply_effect(ledger: &mut Ledger, params: &ActionParameters, rules: &ValidationRules) {
        match params {
            ActionParameters::PurchaseAircraft { count } => {
                ledger.fleet_size = ledger.fleet_size.saturating_add(*count);
                ledger.recompute_capacity(rules);
            }
            ActionParameters::AddRoute { route } => {
                ledger.routes.insert(route.clone());
            }
            ActionParameters::MarketingCampaign { reputation_impact } => {
                ledger.adjust_reputation(*reputation_impact as f64);
            }
            ActionParameters::StaffTraining => {
                ledger.staff_level += 1;
                ledger.adjust_reputation(rules.staff_training_reputation_gain);
            }
            ActionParameters::MaintenanceUpgrade => {
                ledger.maintenance_level += 1;
                ledger.adjust_reputation(rules.maintenance_reputation_gain);
            }
        }
    }
}
