//! Per-team round pipeline: validate, execute, consult the advisor.
//!
//! A pipeline only ever touches its own team's staged ledger. Nothing it
//! produces is persisted here; the coordinator commits staged ledgers after
//! the barrier.

use airline_core::{
    AdvisoryNote, Ledger, Money, PlanSource, RoundIncident, SemesterPlan, TeamSettlement, ValidationRules,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::advisory::{consult, AdvisoryClassifier, AdvisoryContext, Verdict};
use crate::executor::{ActionExecutor, ExecutionOutcome};
use crate::validator::{PlanValidator, ValidationReport};

/// Settings shared by every pipeline of a round.
#[derive(Clone)]
pub struct PipelineContext {
    pub round_id: String,
    pub rules: ValidationRules,
    pub advisor: Arc<dyn AdvisoryClassifier>,
    pub advisory_timeout: Duration,
    pub note_threshold: f64,
}

/// Validate and execute the plan again against a newer ledger, after the
/// staged one lost a version-checked write. Advisory output tied to actions
/// that are no longer approved is dropped with them.
pub fn reexecute(settlement: &mut TeamSettlement, fresh: Ledger, rules: &ValidationRules) {
    let (report, outcome) = process_plan(&settlement.plan, &fresh, rules);
    settlement
        .incidents
        .retain(|i| !matches!(i, RoundIncident::InconsistentExecution { .. }));
    absorb(settlement, report, outcome);

    let approved: HashSet<usize> = settlement.approved.iter().map(|a| a.index).collect();
    settlement.incidents.retain(|i| match i {
        RoundIncident::AdvisoryTimeout { action_index, .. } => approved.contains(action_index),
        _ => true,
    });
    settlement
        .advisory_notes
        .retain(|note| approved.contains(&note.action_index));
    settlement.before = fresh;
}

fn absorb(settlement: &mut TeamSettlement, report: ValidationReport, outcome: ExecutionOutcome) {
    for dropped in &outcome.dropped {
        settlement.incidents.push(RoundIncident::InconsistentExecution {
            team_id: settlement.team_id.clone(),
            action_index: dropped.index,
            detail: dropped.reason.describe(),
        });
    }

    let mut rejected = report.rejected;
    rejected.extend(outcome.dropped);
    rejected.sort_by_key(|r| r.index);

    settlement.rejected = rejected;
    settlement.approved = outcome.applied;
    settlement.staged = outcome.ledger;
    settlement.cash_spent = outcome.cash_spent;
    settlement.warnings = report.warnings;
}

/// Validation followed by execution on the validated actions.
pub fn process_plan(
    plan: &SemesterPlan,
    ledger: &Ledger,
    rules: &ValidationRules,
) -> (ValidationReport, ExecutionOutcome) {
    let report = PlanValidator::validate(plan, ledger, rules);
    let outcome = ActionExecutor::execute(ledger, &report.approved, rules);
    (report, outcome)
}

pub async fn run_pipeline(
    ctx: &PipelineContext,
    plan: SemesterPlan,
    plan_source: PlanSource,
    ledger: Ledger,
) -> TeamSettlement {
    let team_id = ledger.team_id.clone();
    let (report, outcome) = process_plan(&plan, &ledger, &ctx.rules);

    let mut result = TeamSettlement {
        team_id: team_id.clone(),
        plan,
        plan_source,
        before: ledger.clone(),
        staged: ledger.clone(),
        approved: Vec::new(),
        rejected: Vec::new(),
        cash_spent: Money::ZERO,
        warnings: Vec::new(),
        advisory_notes: Vec::new(),
        incidents: Vec::new(),
    };
    absorb(&mut result, report, outcome);

    let context = AdvisoryContext::for_ledger(&ledger, &ctx.round_id);
    let consultations = join_all(result.approved.iter().map(|item| {
        let context = &context;
        async move {
            let consultation =
                consult(ctx.advisor.as_ref(), &item.action, context, ctx.advisory_timeout).await;
            (item, consultation)
        }
    }))
    .await;

    let mut notes = Vec::new();
    let mut incidents = Vec::new();
    for (item, consultation) in consultations {
        if consultation.unavailable {
            incidents.push(RoundIncident::AdvisoryTimeout {
                team_id: team_id.clone(),
                action_index: item.index,
            });
            continue;
        }
        let advice = consultation.advice;
        if advice.verdict == Verdict::Implausible && advice.confidence >= ctx.note_threshold {
            notes.push(AdvisoryNote {
                action_index: item.index,
                message: format!(
                    "({}) looks implausible (confidence {:.2})",
                    item.action.action_type.as_str(),
                    advice.confidence
                ),
            });
        }
    }
    result.advisory_notes = notes;
    result.incidents.extend(incidents);

    info!(
        round_id = %ctx.round_id,
        team_id = %team_id,
        approved = result.approved.len(),
        rejected = result.rejected.len(),
        "Team pipeline finished"
    );
    debug!(team_id = %team_id, notes = result.advisory_notes.len(), "Advisory notes collected");

    result
}
