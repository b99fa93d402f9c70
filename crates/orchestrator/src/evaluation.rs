use airline_core::{
    AdvisoryNote, AppliedEvent, ApprovedAction, EvaluationRecord, Ledger, LedgerDelta, Money, PlanSource,
    ReconsiderItem, RejectedAction, RoundIncident, ScoringWeights,
};
use chrono::Utc;
use std::fmt::Write;

/// Everything the evaluation of one team in one round looks at.
#[derive(Debug, Clone)]
pub struct EvaluationInput<'a> {
    pub round_id: &'a str,
    /// Ledger as it was when the round started.
    pub before: &'a Ledger,
    /// Ledger after execution and the market update.
    pub after: &'a Ledger,
    pub approved: &'a [ApprovedAction],
    pub rejected: &'a [RejectedAction],
    pub plan_source: &'a PlanSource,
    pub budget_claim: Money,
    pub cash_spent: Money,
    pub events: &'a [AppliedEvent],
    pub advisory_notes: &'a [AdvisoryNote],
    pub incidents: &'a [RoundIncident],
}

/// Rubric metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub approval_rate: f64,
    pub budget_utilization: f64,
    pub capacity_growth: f64,
    pub market_share: f64,
}

impl Metrics {
    pub fn compute(input: &EvaluationInput<'_>, weights: &ScoringWeights) -> Self {
        let total = input.approved.len() + input.rejected.len();
        let approval_rate = if total == 0 {
            0.0
        } else {
            input.approved.len() as f64 / total as f64
        };

        let cash_before = input.before.cash;
        let available = if input.budget_claim.is_zero() {
            cash_before
        } else {
            input.budget_claim.min(cash_before)
        };
        let budget_utilization = if available.cents() <= 0 {
            0.0
        } else {
            (input.cash_spent.to_float() / available.to_float()).clamp(0.0, 1.0)
        };

        let seats_before = input.before.capacity.seat_capacity;
        let seats_after = input.after.capacity.seat_capacity;
        let capacity_growth = ((seats_after as f64 - seats_before as f64)
            / seats_before.max(1) as f64)
            .clamp(0.0, 1.0);

        let share_delta = input.after.market_share - input.before.market_share;
        let market_share = (0.5 + share_delta * weights.share_sensitivity).clamp(0.0, 1.0);

        Self {
            approval_rate,
            budget_utilization,
            capacity_growth,
            market_share,
        }
    }

    /// Weighted mean scaled to 0..=100.
    pub fn score(&self, weights: &ScoringWeights) -> f64 {
        let weight_sum =
            weights.approval + weights.budget_utilization + weights.capacity_growth + weights.market_share;
        if weight_sum <= 0.0 {
            return 0.0;
        }
        let weighted = weights.approval * self.approval_rate
            + weights.budget_utilization * self.budget_utilization
            + weights.capacity_growth * self.capacity_growth
            + weights.market_share * self.market_share;
        100.0 * weighted / weight_sum
    }
}

pub struct EvaluationEngine;

impl EvaluationEngine {
    pub fn evaluate(input: &EvaluationInput<'_>, weights: &ScoringWeights) -> EvaluationRecord {
        let metrics = Metrics::compute(input, weights);
        let score = metrics.score(weights);
        let delta = LedgerDelta::between(input.before, input.after);

        let mut strengths = Vec::new();
        if metrics.approval_rate > 0.8 {
            strengths.push("Most planned actions were feasible".to_string());
        }
        if metrics.budget_utilization > 0.7 {
            strengths.push("Budget was put to work efficiently".to_string());
        }
        if input.approved.len() > 5 {
            strengths.push("Ambitious plan carried out at scale".to_string());
        }
        if delta.seat_capacity_delta > 0 {
            strengths.push(format!("Seat capacity grew by {}", delta.seat_capacity_delta));
        }

        let mut improvement_areas = Vec::new();
        if matches!(input.plan_source, PlanSource::Default { .. }) {
            improvement_areas.push("No plan was submitted before the deadline".to_string());
        }
        let planned = input.approved.len() + input.rejected.len();
        if planned > 0 && metrics.approval_rate < 0.5 {
            improvement_areas.push("Check budget and capacity before planning actions".to_string());
        }
        if metrics.budget_utilization < 0.5 {
            improvement_areas.push("Much of the available budget went unused".to_string());
        }
        if input.rejected.len() > 3 {
            improvement_areas.push(format!("{} actions were rejected", input.rejected.len()));
        }
        if delta.market_share_delta < 0.0 {
            improvement_areas.push("Market share declined this round".to_string());
        }

        let reconsider: Vec<ReconsiderItem> = input.rejected.iter().map(ReconsiderItem::from).collect();
        let feedback_text = feedback_text(input, score, &reconsider);

        EvaluationRecord {
            team_id: input.after.team_id.clone(),
            round_id: input.round_id.to_string(),
            score,
            feedback_text,
            ledger_delta: delta,
            strengths,
            improvement_areas,
            reconsider,
            approved_actions: input.approved.to_vec(),
            rejected_actions: input.rejected.to_vec(),
            plan_source: input.plan_source.clone(),
            created_at: Utc::now(),
        }
    }
}

fn feedback_text(input: &EvaluationInput<'_>, score: f64, reconsider: &[ReconsiderItem]) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Round {}: score {:.1}/100. {} of {} actions applied, {} spent.",
        input.round_id,
        score,
        input.approved.len(),
        input.approved.len() + input.rejected.len(),
        input.cash_spent
    );

    match input.plan_source {
        PlanSource::Submitted => {}
        PlanSource::Default { policy } => {
            let _ = writeln!(text, "No plan arrived in time; the {} default was used.", policy.as_str());
        }
        PlanSource::Substituted { reason } => {
            let _ = writeln!(text, "Your round could not be processed and was skipped: {}", reason);
        }
    }

    if !reconsider.is_empty() {
        let _ = writeln!(text, "Reconsider:");
        for item in reconsider {
            let _ = writeln!(
                text,
                "- #{} {} ({}): {}",
                item.index,
                item.action.action_type.as_str(),
                item.reason,
                item.detail
            );
        }
    }

    for note in input.advisory_notes {
        let _ = writeln!(text, "Advisor: {}", note);
    }

    for incident in input.incidents {
        let line = match incident {
            RoundIncident::MissingSubmission { .. } => continue,
            RoundIncident::InconsistentExecution { action_index, detail, .. } => {
                format!("action #{} was dropped at execution: {}", action_index, detail)
            }
            RoundIncident::AdvisoryTimeout { action_index, .. } => {
                format!("no advisory opinion for action #{}", action_index)
            }
            RoundIncident::PipelineFailure { reason, .. } => format!("processing failed: {}", reason),
            RoundIncident::LedgerWriteRetried { attempts, .. } => {
                format!("ledger write retried {} times", attempts)
            }
        };
        let _ = writeln!(text, "Note: {}", line);
    }

    if !input.events.is_empty() {
        let descriptions: Vec<&str> = input.events.iter().map(|e| e.description.as_str()).collect();
        let _ = writeln!(text, "Market events: {}", descriptions.join("; "));
    }

    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use airline_core::{Action, ActionType, DefaultPlanPolicy, RejectionReason, ValidationRules};

    fn approved(n: usize) -> Vec<ApprovedAction> {
        (0..n)
            .map(|index| ApprovedAction {
                index,
                action: Action::new(ActionType::StaffTraining, "crew", Money::from_units(1_000)),
            })
            .collect()
    }

    fn rejected(index: usize) -> RejectedAction {
        RejectedAction {
            index,
            action: Action::new(ActionType::AddRoute, "route", Money::from_units(50_000)),
            reason: RejectionReason::BudgetExceeded {
                cost: Money::from_units(50_000),
                remaining: Money::from_units(20_000),
            },
        }
    }

    fn input<'a>(
        before: &'a Ledger,
        after: &'a Ledger,
        approved: &'a [ApprovedAction],
        rejected: &'a [RejectedAction],
        source: &'a PlanSource,
    ) -> EvaluationInput<'a> {
        EvaluationInput {
            round_id: "R1",
            before,
            after,
            approved,
            rejected,
            plan_source: source,
            budget_claim: Money::ZERO,
            cash_spent: before.cash - after.cash,
            events: &[],
            advisory_notes: &[],
            incidents: &[],
        }
    }

    #[test]
    fn test_metrics_for_partial_plan() {
        let rules = ValidationRules::default();
        let before = Ledger::new("T1", "Airline", Money::from_units(100_000));
        let mut after = before.clone().with_fleet(1, &rules);
        after.cash = Money::from_units(20_000);
        let approved = approved(1);
        let rejected = vec![rejected(1)];
        let source = PlanSource::Submitted;

        let input = input(&before, &after, &approved, &rejected, &source);
        let metrics = Metrics::compute(&input, &ScoringWeights::default());

        assert_eq!(metrics.approval_rate, 0.5);
        assert_eq!(metrics.budget_utilization, 0.8);
        assert_eq!(metrics.capacity_growth, 1.0);
        assert_eq!(metrics.market_share, 0.5);
    }

    #[test]
    fn test_score_in_range_and_reconsider_listed() {
        let before = Ledger::new("T1", "Airline", Money::from_units(100_000));
        let after = before.clone();
        let rejected = vec![rejected(0), rejected(1)];
        let source = PlanSource::Submitted;

        let record = EvaluationEngine::evaluate(
            &input(&before, &after, &[], &rejected, &source),
            &ScoringWeights::default(),
        );

        assert!((0.0..=100.0).contains(&record.score));
        assert_eq!(record.reconsider.len(), 2);
        assert_eq!(record.reconsider[0].reason, "BudgetExceeded");
        assert!(record.feedback_text.contains("Reconsider"));
        assert!(record
            .improvement_areas
            .iter()
            .any(|a| a.contains("budget and capacity")));
    }

    #[test]
    fn test_default_plan_feedback() {
        let before = Ledger::new("T1", "Airline", Money::from_units(100_000));
        let source = PlanSource::Default {
            policy: DefaultPlanPolicy::Empty,
        };
        let record = EvaluationEngine::evaluate(
            &input(&before, &before, &[], &[], &source),
            &ScoringWeights::default(),
        );

        assert_eq!(record.approval_rate(), 0.0);
        assert!(record.improvement_areas[0].contains("No plan"));
        assert!(record.feedback_text.contains("default"));
    }

    #[test]
    fn test_strengths_for_full_plan() {
        let rules = ValidationRules::default();
        let before = Ledger::new("T1", "Airline", Money::from_units(10_000)).with_fleet(1, &rules);
        let mut after = before.clone().with_fleet(2, &rules);
        after.cash = Money::from_units(2_000);
        after.market_share = 0.2;
        let approved = approved(6);
        let source = PlanSource::Submitted;

        let record = EvaluationEngine::evaluate(
            &input(&before, &after, &approved, &[], &source),
            &ScoringWeights::default(),
        );

        assert_eq!(record.strengths.len(), 4);
        assert!(record.improvement_areas.is_empty());
        assert!(record.score > 90.0);
    }

    #[test]
    fn test_notes_and_incidents_in_feedback() {
        let before = Ledger::new("T1", "Airline", Money::from_units(100_000));
        let source = PlanSource::Submitted;
        let notes = vec![AdvisoryNote {
            action_index: 0,
            message: "(purchase_aircraft) looks implausible (confidence 0.90)".to_string(),
        }];
        let incidents = vec![RoundIncident::AdvisoryTimeout {
            team_id: "T1".to_string(),
            action_index: 1,
        }];
        let mut input = input(&before, &before, &[], &[], &source);
        input.advisory_notes = &notes;
        input.incidents = &incidents;

        let record = EvaluationEngine::evaluate(&input, &ScoringWeights::default());
        assert!(record.feedback_text.contains("Advisor: action #0"));
        assert!(record.feedback_text.contains("no advisory opinion for action #1"));
    }
}
