//! Plan validation.
//!
//! Walks a plan in submitted order and decides, per action, whether it fits
//! the team's budget and capacity. A failing action is rejected on its own;
//! the rest of the plan is still considered, so a plan that is too large is
//! accepted as far as it fits.

use airline_core::{
    ApprovedAction, Ledger, Money, RejectedAction, RejectionReason, SemesterPlan, ValidationRules,
};
use serde::{Deserialize, Serialize};

use crate::rules::ProjectedState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub approved: Vec<ApprovedAction>,
    pub rejected: Vec<RejectedAction>,
    /// Sum of the approved actions' costs.
    pub cash_committed: Money,
    /// Plan-level remarks that do not reject any action.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn approval_rate(&self) -> f64 {
        let total = self.approved.len() + self.rejected.len();
        if total == 0 {
            return 0.0;
        }
        self.approved.len() as f64 / total as f64
    }
}

pub struct PlanValidator;

impl PlanValidator {
    /// Pure and deterministic: the same plan against the same ledger always
    /// produces the same report.
    pub fn validate(plan: &SemesterPlan, ledger: &Ledger, rules: &ValidationRules) -> ValidationReport {
        let mut warnings = Vec::new();

        let total_cost = plan.total_cost();
        if plan.total_budget_claim > ledger.cash {
            warnings.push(format!(
                "Claimed budget {} exceeds available cash {}",
                plan.total_budget_claim, ledger.cash
            ));
        }
        if plan.total_budget_claim != total_cost {
            warnings.push(format!(
                "Claimed budget {} differs from the sum of action costs {}",
                plan.total_budget_claim, total_cost
            ));
        }

        let budget = if rules.enforce_budget_claim {
            ledger.cash.min(plan.total_budget_claim)
        } else {
            ledger.cash
        };

        let mut remaining = budget;
        let mut projected = ProjectedState::from_ledger(ledger);
        let mut approved = Vec::new();
        let mut rejected = Vec::new();

        for (index, action) in plan.actions.iter().enumerate() {
            let reject = |reason: RejectionReason| RejectedAction {
                index,
                action: action.clone(),
                reason,
            };

            if action.cost > remaining {
                rejected.push(reject(RejectionReason::BudgetExceeded {
                    cost: action.cost,
                    remaining,
                }));
                continue;
            }

            let params = match action.parameters() {
                Ok(params) => params,
                Err(detail) => {
                    rejected.push(reject(RejectionReason::InvalidParameters { detail }));
                    continue;
                }
            };

            if let Err(detail) = projected.check_capacity(&params, rules) {
                rejected.push(reject(RejectionReason::CapacityExceeded { detail }));
                continue;
            }

            if let Err(detail) = projected.check_parameters(&params) {
                rejected.push(reject(RejectionReason::InvalidParameters { detail }));
                continue;
            }

            remaining -= action.cost;
            projected.apply(&params);
            approved.push(ApprovedAction {
                index,
                action: action.clone(),
            });
        }

        if approved.is_empty() && !plan.actions.is_empty() {
            warnings.push("No action in the plan could be approved".to_string());
        }

        ValidationReport {
            cash_committed: budget - remaining,
            approved,
            rejected,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airline_core::{Action, ActionType};

    fn ledger(cash: i64) -> Ledger {
        Ledger::new("T1", "Airline T1", Money::from_units(cash))
    }

    fn purchase(cost: i64) -> Action {
        Action::new(ActionType::PurchaseAircraft, "A320", Money::from_units(cost))
    }

    fn route(cost: i64, route: &str) -> Action {
        Action::new(ActionType::AddRoute, "route", Money::from_units(cost)).with_parameter("route", route)
    }

    #[test]
    fn test_partial_acceptance_by_budget() {
        let plan = SemesterPlan::new("T1", "R1", vec![purchase(80_000), route(50_000, "PRG-LHR")]);
        let report = PlanValidator::validate(&plan, &ledger(100_000), &ValidationRules::default());

        assert_eq!(report.approved.len(), 1);
        assert_eq!(report.approved[0].action.action_type, ActionType::PurchaseAircraft);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 1);
        assert_eq!(report.rejected[0].reason.tag(), "BudgetExceeded");
        assert_eq!(report.cash_committed, Money::from_units(80_000));
    }

    #[test]
    fn test_later_cheaper_action_still_fits() {
        let plan = SemesterPlan::new(
            "T1",
            "R1",
            vec![purchase(90_000), purchase(20_000), purchase(10_000)],
        );
        let report = PlanValidator::validate(&plan, &ledger(100_000), &ValidationRules::default());

        let indices: Vec<_> = report.approved.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.cash_committed, Money::from_units(100_000));
    }

    #[test]
    fn test_route_capacity_uses_aircraft_bought_earlier() {
        let rules = ValidationRules::default();
        let before = SemesterPlan::new("T1", "R1", vec![route(1_000, "PRG-LHR"), purchase(1_000)]);
        let report = PlanValidator::validate(&before, &ledger(100_000), &rules);
        assert_eq!(report.rejected[0].reason.tag(), "CapacityExceeded");

        let after = SemesterPlan::new("T1", "R1", vec![purchase(1_000), route(1_000, "PRG-LHR")]);
        let report = PlanValidator::validate(&after, &ledger(100_000), &rules);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        let plan = SemesterPlan::new(
            "T1",
            "R1",
            vec![
                purchase(1_000),
                route(1_000, "not-a-route"),
                Action::new(ActionType::MarketingCampaign, "ads", Money::from_units(1_000))
                    .with_parameter("reputation_impact", 50),
            ],
        );
        let report = PlanValidator::validate(&plan, &ledger(100_000), &ValidationRules::default());

        assert_eq!(report.approved.len(), 1);
        assert!(report
            .rejected
            .iter()
            .all(|r| r.reason.tag() == "InvalidParameters"));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let rules = ValidationRules::default();
        let existing = ledger(100_000)
            .with_fleet(3, &rules)
            .with_routes(["PRG-LHR"]);
        let plan = SemesterPlan::new(
            "T1",
            "R1",
            vec![route(1_000, "PRG-LHR"), route(1_000, "PRG-CDG"), route(1_000, "PRG-CDG")],
        );
        let report = PlanValidator::validate(&plan, &existing, &rules);

        let rejected: Vec<_> = report.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![0, 2]);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let rules = ValidationRules::default();
        let plan = SemesterPlan::new(
            "T1",
            "R1",
            vec![purchase(30_000), route(20_000, "PRG-VIE"), purchase(90_000)],
        );
        let ledger = ledger(100_000);

        let first = PlanValidator::validate(&plan, &ledger, &rules);
        let second = PlanValidator::validate(&plan, &ledger, &rules);
        assert_eq!(first, second);
    }

    #[test]
    fn test_budget_claim_enforcement() {
        let mut rules = ValidationRules::default();
        rules.enforce_budget_claim = true;
        let plan = SemesterPlan::new("T1", "R1", vec![purchase(40_000), purchase(40_000)])
            .with_budget_claim(Money::from_units(50_000));

        let report = PlanValidator::validate(&plan, &ledger(100_000), &rules);
        assert_eq!(report.approved.len(), 1);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_empty_plan() {
        let report = PlanValidator::validate(
            &SemesterPlan::empty("T1", "R1"),
            &ledger(100_000),
            &ValidationRules::default(),
        );
        assert!(report.approved.is_empty());
        assert!(report.rejected.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.cash_committed, Money::ZERO);
    }
}
