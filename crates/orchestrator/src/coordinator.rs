//! Round coordinator.
//!
//! Owns the round lifecycle: plan intake, the per-team pipelines, the
//! barrier, the single-writer market update and evaluation. Every
//! persisted write goes through a version-checked store operation.

use airline_core::{
    validate_id, DefaultPlanPolicy, EvaluationRecord, Ledger, MarketState, Money, PlanPayload,
    PlanSource, Round, RoundIncident, RoundStatus, SemesterPlan, SimulationConfig, TeamSettlement,
    RESERVED_MARKET_KEY,
};
use chrono::{DateTime, Utc};
use db::{DbError, Repositories, RoundDocument, SIMULATION};
use events::{Event, EventBus};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advisory::{AdvisoryClassifier, NoAdvisor};
use crate::barrier::RoundBarrier;
use crate::error::{OrchestratorError, Result};
use crate::evaluation::{EvaluationEngine, EvaluationInput};
use crate::market::{MarketUpdate, MarketUpdateEngine};
use crate::pipeline::{reexecute, run_pipeline, PipelineContext};
use crate::state_machine::RoundStateMachine;
use crate::status::{RoundSubmissions, SimulationStatus};
use crate::validator::{PlanValidator, ValidationReport};

/// Receipt for an accepted plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionAck {
    pub team_id: String,
    pub round_id: String,
    pub submitted_at: DateTime<Utc>,
    pub action_count: usize,
    /// Validation against the ledger as of submission. Advisory only; the
    /// binding validation runs when the round advances.
    pub preview: ValidationReport,
}

/// Outcome of a closed round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub round: Round,
    pub market: MarketState,
    pub evaluations: Vec<EvaluationRecord>,
}

struct Settings {
    config: Arc<SimulationConfig>,
    round_set_id: Uuid,
}

pub struct RoundCoordinator {
    repos: Repositories,
    event_bus: EventBus,
    settings: RwLock<Settings>,
    advisor: Arc<dyn AdvisoryClassifier>,
    /// Serializes market updates.
    market_lock: Mutex<()>,
    /// Held shared by submissions and exclusively while intake closes, so no
    /// plan lands after the round has left `collecting`.
    intake_gate: RwLock<()>,
    /// Serializes opening rounds, resets and config swaps.
    admin_lock: Mutex<()>,
    /// Held while a round is carried from `market_updating` to `closed`.
    settle_lock: Mutex<()>,
}

impl RoundCoordinator {
    pub fn new(repos: Repositories, event_bus: EventBus, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repos,
            event_bus,
            settings: RwLock::new(Settings {
                config: Arc::new(config),
                round_set_id: Uuid::new_v4(),
            }),
            advisor: Arc::new(NoAdvisor),
            market_lock: Mutex::new(()),
            intake_gate: RwLock::new(()),
            admin_lock: Mutex::new(()),
            settle_lock: Mutex::new(()),
        })
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn AdvisoryClassifier>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub async fn config(&self) -> Arc<SimulationConfig> {
        self.settings.read().await.config.clone()
    }

    pub async fn round_set_id(&self) -> Uuid {
        self.settings.read().await.round_set_id
    }

    pub async fn register_team(&self, team_id: &str, name: &str) -> Result<Ledger> {
        validate_id(team_id)?;
        let config = self.config().await;
        let ledger = Ledger::new(team_id, name, starting_cash(&config)?);

        let ledger = match self.repos.ledgers.create(&ledger).await {
            Ok(ledger) => ledger,
            Err(DbError::AlreadyExists { .. }) => {
                return Err(OrchestratorError::TeamAlreadyRegistered(team_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        info!(team_id = %team_id, name = %name, cash = %ledger.cash, "Team registered");
        self.event_bus.emit(Event::TeamRegistered {
            team_id: team_id.to_string(),
            name: name.to_string(),
        });
        Ok(ledger)
    }

    pub async fn get_ledger(&self, team_id: &str) -> Result<Ledger> {
        self.repos
            .ledgers
            .find_by_team(team_id)
            .await?
            .ok_or_else(|| OrchestratorError::TeamNotFound(team_id.to_string()))
    }

    pub async fn list_ledgers(&self) -> Result<Vec<Ledger>> {
        Ok(self.repos.ledgers.find_all().await?)
    }

    /// Open a round for every registered team. Only one round may be active.
    pub async fn open_round(&self, round_id: &str, deadline: DateTime<Utc>) -> Result<Round> {
        validate_id(round_id)?;
        let _admin = self.admin_lock.lock().await;

        let rounds = self.repos.rounds.find_all().await?;
        if rounds.iter().any(|r| r.round.round_id == round_id) {
            return Err(OrchestratorError::RoundAlreadyExists(round_id.to_string()));
        }
        if let Some(active) = rounds.iter().find(|r| !r.round.status.is_terminal()) {
            return Err(OrchestratorError::RoundActive(active.round.round_id.clone()));
        }

        let participants: std::collections::BTreeSet<String> = self
            .repos
            .ledgers
            .find_all()
            .await?
            .into_iter()
            .map(|l| l.team_id)
            .collect();
        if participants.is_empty() {
            return Err(OrchestratorError::NoTeams);
        }

        let previous = rounds
            .iter()
            .rev()
            .find(|r| r.round.status == RoundStatus::Closed)
            .map(|r| r.round.round_id.clone());

        let round = Round::new(round_id, self.round_set_id().await, deadline, participants)
            .with_previous_round(previous);
        let doc = match self.repos.rounds.create(&RoundDocument::new(round)).await {
            Ok(doc) => doc,
            Err(DbError::AlreadyExists { .. }) => {
                return Err(OrchestratorError::RoundAlreadyExists(round_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            round_id = %round_id,
            deadline = %deadline,
            participants = doc.round.participants.len(),
            "Round opened"
        );
        self.event_bus.emit(Event::RoundOpened {
            round_id: round_id.to_string(),
            deadline,
            participants: doc.round.participants.iter().cloned().collect(),
        });
        Ok(doc.round)
    }

    pub async fn get_round(&self, round_id: &str) -> Result<Round> {
        Ok(self.load_round(round_id).await?.round)
    }

    pub async fn list_rounds(&self) -> Result<Vec<Round>> {
        Ok(self
            .repos
            .rounds
            .find_all()
            .await?
            .into_iter()
            .map(|d| d.round)
            .collect())
    }

    /// Accept a raw plan payload. Structural problems are schema errors.
    pub async fn submit_plan(&self, payload: serde_json::Value) -> Result<SubmissionAck> {
        let plan = PlanPayload::from_json(payload)?.into_plan(Utc::now())?;
        self.submit(plan).await
    }

    /// Accept a team's plan while the round is collecting and before its
    /// deadline. One plan per team and round; it cannot be replaced.
    pub async fn submit(&self, plan: SemesterPlan) -> Result<SubmissionAck> {
        let _intake = self.intake_gate.read().await;

        let round = self.load_round(&plan.round_id).await?.round;
        if round.status == RoundStatus::Aborted {
            return Err(OrchestratorError::RoundAborted(round.round_id));
        }
        if !round.intake_open(Utc::now()) {
            return Err(OrchestratorError::IntakeClosed(round.round_id));
        }

        let ledger = self.get_ledger(&plan.team_id).await?;
        if !round.participants.contains(&plan.team_id) {
            return Err(OrchestratorError::NotParticipant {
                team_id: plan.team_id.clone(),
                round_id: round.round_id,
            });
        }

        let config = self.config().await;
        let preview = PlanValidator::validate(&plan, &ledger, &config.validation_rules);

        match self.repos.plans.create(&plan).await {
            Ok(_) => {}
            Err(DbError::AlreadyExists { .. }) => {
                return Err(OrchestratorError::DuplicateSubmission {
                    team_id: plan.team_id.clone(),
                    round_id: plan.round_id.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            round_id = %plan.round_id,
            team_id = %plan.team_id,
            actions = plan.actions.len(),
            "Plan submitted"
        );
        self.event_bus.emit(Event::PlanSubmitted {
            round_id: plan.round_id.clone(),
            team_id: plan.team_id.clone(),
            action_count: plan.actions.len(),
        });

        Ok(SubmissionAck {
            team_id: plan.team_id,
            round_id: plan.round_id,
            submitted_at: plan.submitted_at,
            action_count: plan.actions.len(),
            preview,
        })
    }

    /// Which participants have handed in a plan for the round so far.
    pub async fn round_submissions(&self, round_id: &str) -> Result<RoundSubmissions> {
        let round = self.load_round(round_id).await?.round;
        let plans = self.repos.plans.find_by_round(round_id).await?;
        Ok(RoundSubmissions::build(&round, &plans, Utc::now()))
    }

    /// Pull the intake deadline forward to now.
    pub async fn close_intake(&self, round_id: &str) -> Result<Round> {
        let attempts = self.config().await.engine.max_write_attempts;
        for _ in 0..attempts {
            let mut doc = self.load_round(round_id).await?;
            if doc.round.status != RoundStatus::Collecting {
                return Err(OrchestratorError::IntakeClosed(round_id.to_string()));
            }
            doc.round.deadline = doc.round.deadline.min(Utc::now());
            match self.repos.rounds.save(&mut doc).await {
                Ok(()) => {
                    info!(round_id = %round_id, "Intake closed");
                    return Ok(doc.round);
                }
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrchestratorError::ConcurrentModification {
            collection: SIMULATION.to_string(),
            key: round_id.to_string(),
            attempts,
        })
    }

    /// Cancel a round that has not reached the market update.
    pub async fn abort_round(&self, round_id: &str, reason: &str) -> Result<Round> {
        let attempts = self.config().await.engine.max_write_attempts;
        for _ in 0..attempts {
            let mut doc = self.load_round(round_id).await?;
            let from = doc.round.status;
            if !from.is_abortable() {
                return Err(OrchestratorError::AbortNotAllowed {
                    round_id: round_id.to_string(),
                    status: from.to_string(),
                });
            }
            RoundStateMachine::validate_transition(&from, &RoundStatus::Aborted)?;
            doc.round.status = RoundStatus::Aborted;
            match self.repos.rounds.save(&mut doc).await {
                Ok(()) => {
                    warn!(round_id = %round_id, from = %from, reason = %reason, "Round aborted");
                    self.emit_status_change(round_id, from, RoundStatus::Aborted);
                    self.event_bus.emit(Event::RoundAborted {
                        round_id: round_id.to_string(),
                        reason: reason.to_string(),
                    });
                    return Ok(doc.round);
                }
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrchestratorError::ConcurrentModification {
            collection: SIMULATION.to_string(),
            key: round_id.to_string(),
            attempts,
        })
    }

    /// Run a round from `collecting` to `closed`.
    ///
    /// Requires the intake deadline to have passed or every participant to
    /// have submitted. Teams without a plan get the configured default.
    ///
    /// A round that failed after the barrier (in `market_updating` or
    /// `evaluating`) is picked up where it stopped.
    pub async fn advance_round(&self, round_id: &str) -> Result<RoundResult> {
        let config = self.config().await;
        let mut doc = self.load_round(round_id).await?;

        match doc.round.status {
            RoundStatus::Collecting => {}
            status if status.is_settling() => {
                let _settle = self.settle_lock.lock().await;
                let doc = self.load_round(round_id).await?;
                if !doc.round.status.is_settling() {
                    return Err(OrchestratorError::InvalidTransition {
                        from: doc.round.status.to_string(),
                        to: RoundStatus::Closed.to_string(),
                    });
                }
                info!(round_id = %round_id, status = %doc.round.status, "Resuming round");
                return self.settle(doc, &config).await;
            }
            RoundStatus::Aborted => return Err(OrchestratorError::RoundAborted(round_id.to_string())),
            other => {
                return Err(OrchestratorError::InvalidTransition {
                    from: other.to_string(),
                    to: RoundStatus::Validating.to_string(),
                })
            }
        }

        {
            let _intake = self.intake_gate.write().await;
            doc = self.load_round(round_id).await?;
            let submitted = self.repos.plans.find_by_round(round_id).await?;
            let everyone_in = doc
                .round
                .participants
                .iter()
                .all(|team| submitted.iter().any(|p| &p.team_id == team));
            if doc.round.intake_open(Utc::now()) && !everyone_in {
                return Err(OrchestratorError::IntakeStillOpen(round_id.to_string()));
            }
            self.transition(&mut doc, RoundStatus::Validating).await?;
        }

        // validating: settle every participant's plan
        let plans = self.assemble_plans(&mut doc, &config).await?;
        let mut ledgers = BTreeMap::new();
        for team_id in &doc.round.participants {
            ledgers.insert(team_id.clone(), self.get_ledger(team_id).await?);
        }
        self.transition(&mut doc, RoundStatus::Executing).await?;

        // executing: one pipeline per team, joined at the barrier
        let barrier = Arc::new(RoundBarrier::new(round_id, doc.round.participants.clone()));
        self.spawn_pipelines(round_id, &config, plans, ledgers, barrier.clone());
        self.transition(&mut doc, RoundStatus::AwaitingBarrier).await?;

        let ceiling = Duration::from_millis(config.engine.barrier_ceiling_ms);
        let results = match barrier.wait(ceiling).await {
            Ok(results) => results,
            Err(e) => {
                error!(round_id = %round_id, error = %e, "Round stuck at the barrier");
                self.event_bus.emit(Event::Error {
                    message: e.to_string(),
                    context: Some(round_id.to_string()),
                });
                return Err(e);
            }
        };

        // settlements land together with the status change
        let _settle = self.settle_lock.lock().await;
        doc.settlements = results;
        self.transition(&mut doc, RoundStatus::MarketUpdating).await?;
        self.settle(doc, &config).await
    }

    /// Market state as of the end of the given round.
    pub async fn get_market_state(&self, round_id: &str) -> Result<MarketState> {
        self.load_round(round_id)
            .await?
            .market
            .ok_or_else(|| OrchestratorError::MarketNotAvailable(round_id.to_string()))
    }

    /// Current market, or the initial one before the first round.
    pub async fn current_market(&self) -> Result<MarketState> {
        match self.repos.market.current().await? {
            Some(market) => Ok(market),
            None => Ok(MarketState::initial(self.config().await.market.base_passengers)),
        }
    }

    pub async fn get_evaluation(&self, team_id: &str, round_id: &str) -> Result<EvaluationRecord> {
        self.repos
            .feedback
            .find(team_id, round_id)
            .await?
            .ok_or_else(|| OrchestratorError::EvaluationNotFound {
                team_id: team_id.to_string(),
                round_id: round_id.to_string(),
            })
    }

    /// Every evaluation a team has received, oldest first.
    pub async fn feedback_history(&self, team_id: &str) -> Result<Vec<EvaluationRecord>> {
        self.get_ledger(team_id).await?;
        Ok(self.repos.feedback.find_by_team(team_id).await?)
    }

    pub async fn simulation_status(&self) -> Result<SimulationStatus> {
        let ledgers = self.repos.ledgers.find_all().await?;
        let rounds = self.list_rounds().await?;
        let mut evaluations = Vec::new();
        for ledger in &ledgers {
            evaluations.extend(self.repos.feedback.find_by_team(&ledger.team_id).await?);
        }

        Ok(SimulationStatus::build(
            self.round_set_id().await,
            &ledgers,
            self.current_market().await?,
            &rounds,
            &evaluations,
        ))
    }

    /// Drop all rounds, plans, feedback and the market, and put every
    /// airline back at its starting state. Returns the number of teams.
    ///
    /// Rounds before the barrier have to be aborted first. A round stuck
    /// past the barrier is dropped along with everything else.
    pub async fn reset_simulation(&self) -> Result<usize> {
        let _admin = self.admin_lock.lock().await;
        let _settle = self.settle_lock.lock().await;
        if let Some(active) = self
            .repos
            .rounds
            .find_active()
            .await?
            .into_iter()
            .find(|r| !r.round.status.is_settling())
        {
            return Err(OrchestratorError::RoundActive(active.round.round_id));
        }

        let config = self.config().await;
        self.repos.clear_round_data().await?;

        let ledgers = self.repos.ledgers.find_all().await?;
        for ledger in &ledgers {
            let fresh = Ledger::new(ledger.team_id.clone(), ledger.name.clone(), starting_cash(&config)?);
            self.repos.ledgers.save(&fresh, ledger.version).await?;
        }

        warn!(teams = ledgers.len(), "Simulation reset");
        self.event_bus.emit(Event::SimulationReset {
            teams: ledgers.len(),
        });
        Ok(ledgers.len())
    }

    /// Swap in a new configuration for the rounds that follow.
    pub async fn start_round_set(&self, config: SimulationConfig) -> Result<Uuid> {
        config.validate()?;
        let _admin = self.admin_lock.lock().await;
        self.ensure_no_active_round().await?;

        let mut settings = self.settings.write().await;
        settings.config = Arc::new(config);
        settings.round_set_id = Uuid::new_v4();
        info!(round_set_id = %settings.round_set_id, "Round set started");
        Ok(settings.round_set_id)
    }

    async fn load_round(&self, round_id: &str) -> Result<RoundDocument> {
        self.repos
            .rounds
            .find(round_id)
            .await?
            .ok_or_else(|| OrchestratorError::RoundNotFound(round_id.to_string()))
    }

    async fn ensure_no_active_round(&self) -> Result<()> {
        match self.repos.rounds.find_active().await?.first() {
            Some(active) => Err(OrchestratorError::RoundActive(active.round.round_id.clone())),
            None => Ok(()),
        }
    }

    fn emit_status_change(&self, round_id: &str, from: RoundStatus, to: RoundStatus) {
        self.event_bus.emit(Event::RoundStatusChanged {
            round_id: round_id.to_string(),
            from_status: from.to_string(),
            to_status: to.to_string(),
        });
    }

    /// Move the round one step forward and persist it. Losing the write to a
    /// concurrent abort surfaces as `RoundAborted`.
    async fn transition(&self, doc: &mut RoundDocument, to: RoundStatus) -> Result<()> {
        let from = doc.round.status;
        RoundStateMachine::validate_transition(&from, &to)?;

        doc.round.status = to;
        if let Err(e) = self.repos.rounds.save(doc).await {
            doc.round.status = from;
            if !e.is_version_conflict() {
                return Err(e.into());
            }
            let round_id = doc.round.round_id.clone();
            if let Some(current) = self.repos.rounds.find(&round_id).await? {
                if current.round.status == RoundStatus::Aborted {
                    warn!(round_id = %round_id, "Round was aborted while advancing");
                    return Err(OrchestratorError::RoundAborted(round_id));
                }
            }
            return Err(OrchestratorError::ConcurrentModification {
                collection: SIMULATION.to_string(),
                key: round_id,
                attempts: 1,
            });
        }

        debug!(round_id = %doc.round.round_id, from = %from, to = %to, "Round status changed");
        self.emit_status_change(&doc.round.round_id, from, to);
        Ok(())
    }

    /// Stored plans for submitters, the default plan for everyone else.
    async fn assemble_plans(
        &self,
        doc: &mut RoundDocument,
        config: &SimulationConfig,
    ) -> Result<BTreeMap<String, (SemesterPlan, PlanSource)>> {
        let round_id = doc.round.round_id.clone();
        let mut submitted: BTreeMap<String, SemesterPlan> = self
            .repos
            .plans
            .find_by_round(&round_id)
            .await?
            .into_iter()
            .map(|p| (p.team_id.clone(), p))
            .collect();

        let policy = config.default_plan_policy;
        let mut plans = BTreeMap::new();
        let participants: Vec<String> = doc.round.participants.iter().cloned().collect();

        for team_id in participants {
            if let Some(plan) = submitted.remove(&team_id) {
                doc.round
                    .participant_plans
                    .insert(team_id.clone(), PlanSource::Submitted);
                plans.insert(team_id, (plan, PlanSource::Submitted));
                continue;
            }

            let plan = self
                .default_plan(&team_id, &round_id, doc.round.previous_round_id.as_deref(), policy)
                .await?;
            let source = PlanSource::Default { policy };

            warn!(round_id = %round_id, team_id = %team_id, policy = policy.as_str(), "No plan submitted, using default");
            doc.round.incidents.push(RoundIncident::MissingSubmission {
                team_id: team_id.clone(),
                policy,
            });
            doc.round.participant_plans.insert(team_id.clone(), source.clone());
            self.event_bus.emit(Event::DefaultPlanAssigned {
                round_id: round_id.clone(),
                team_id: team_id.clone(),
                policy: policy.as_str().to_string(),
            });
            plans.insert(team_id, (plan, source));
        }

        Ok(plans)
    }

    async fn default_plan(
        &self,
        team_id: &str,
        round_id: &str,
        previous_round_id: Option<&str>,
        policy: DefaultPlanPolicy,
    ) -> Result<SemesterPlan> {
        let previous = match (policy, previous_round_id) {
            (DefaultPlanPolicy::RepeatPrevious, Some(previous)) => {
                self.repos.feedback.find(team_id, previous).await?
            }
            _ => None,
        };

        Ok(match previous {
            Some(record) => SemesterPlan::new(
                team_id,
                round_id,
                record.approved_actions.into_iter().map(|a| a.action).collect(),
            ),
            None => SemesterPlan::empty(team_id, round_id),
        })
    }

    fn spawn_pipelines(
        &self,
        round_id: &str,
        config: &SimulationConfig,
        plans: BTreeMap<String, (SemesterPlan, PlanSource)>,
        mut ledgers: BTreeMap<String, Ledger>,
        barrier: Arc<RoundBarrier<TeamSettlement>>,
    ) {
        let ctx = Arc::new(PipelineContext {
            round_id: round_id.to_string(),
            rules: config.validation_rules.clone(),
            advisor: self.advisor.clone(),
            advisory_timeout: Duration::from_millis(config.engine.advisory_timeout_ms),
            note_threshold: config.engine.advisory_note_threshold,
        });

        for (team_id, (plan, source)) in plans {
            let Some(ledger) = ledgers.remove(&team_id) else {
                continue;
            };
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            let bus = self.event_bus.clone();

            tokio::spawn(async move {
                let fallback_plan = plan.clone();
                let fallback_ledger = ledger.clone();
                let outcome = AssertUnwindSafe(run_pipeline(&ctx, plan, source, ledger))
                    .catch_unwind()
                    .await;

                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(round_id = %ctx.round_id, team_id = %team_id, reason = %reason, "Team pipeline panicked; substituting a no-op");
                        TeamSettlement::substituted(fallback_plan, fallback_ledger, reason)
                    }
                };

                for incident in &result.incidents {
                    if let RoundIncident::InconsistentExecution {
                        action_index, detail, ..
                    } = incident
                    {
                        bus.emit(Event::InconsistentExecution {
                            round_id: ctx.round_id.clone(),
                            team_id: team_id.clone(),
                            action_index: *action_index,
                            detail: detail.clone(),
                        });
                    }
                }
                bus.emit(Event::TeamPipelineCompleted {
                    round_id: ctx.round_id.clone(),
                    team_id: team_id.clone(),
                    approved: result.approved.len(),
                    rejected: result.rejected.len(),
                    substituted: result.is_substituted(),
                });
                barrier.arrive(&team_id, result).await;
            });
        }
    }

    /// Carry a round from `market_updating` to `closed`: commit ledgers,
    /// update the market, evaluate. Each step skips what an earlier attempt
    /// already did. Caller holds `settle_lock`.
    async fn settle(&self, mut doc: RoundDocument, config: &SimulationConfig) -> Result<RoundResult> {
        let round_id = doc.round.round_id.clone();

        let update = if doc.round.status == RoundStatus::MarketUpdating {
            let team_ids: Vec<String> = doc.settlements.keys().cloned().collect();
            for team_id in team_ids {
                let Some(settlement) = doc.settlements.get(&team_id).cloned() else {
                    continue;
                };
                let committed = self.commit_team_ledger(&round_id, settlement.clone(), config).await?;
                if committed != settlement {
                    doc.settlements.insert(team_id, committed);
                    self.repos.rounds.save(&mut doc).await?;
                }
            }

            let update = match self.update_market(&round_id, &doc, config).await {
                Ok(update) => update,
                Err(e) => {
                    error!(round_id = %round_id, error = %e, fatal = e.is_fatal(), "Market update failed");
                    self.event_bus.emit(Event::Error {
                        message: e.to_string(),
                        context: Some(round_id.clone()),
                    });
                    return Err(e);
                }
            };

            let mut incidents = Vec::new();
            for settlement in doc.settlements.values() {
                incidents.extend(settlement.incidents.iter().cloned());
                if settlement.is_substituted() {
                    doc.round
                        .participant_plans
                        .insert(settlement.team_id.clone(), settlement.plan_source.clone());
                }
            }
            doc.round.incidents.extend(incidents);
            doc.market = Some(update.state.clone());
            self.transition(&mut doc, RoundStatus::Evaluating).await?;
            update
        } else {
            let state = doc
                .market
                .clone()
                .ok_or_else(|| OrchestratorError::MarketNotAvailable(round_id.clone()))?;
            MarketUpdateEngine::from_committed(&round_id, state, &[], config)
        };

        // evaluating: one append-only record per team
        let mut evaluations = Vec::with_capacity(doc.settlements.len());
        for settlement in doc.settlements.values() {
            evaluations.push(self.evaluate_team(&round_id, settlement, &update, config).await?);
        }
        self.transition(&mut doc, RoundStatus::Closed).await?;

        info!(
            round_id = %round_id,
            teams = evaluations.len(),
            market_version = update.state.version,
            incidents = doc.round.incidents.len(),
            "Round closed"
        );

        Ok(RoundResult {
            round: doc.round,
            market: update.state,
            evaluations,
        })
    }

    /// Write a team's staged ledger. A version conflict re-runs the plan
    /// against the fresh ledger; once attempts run out the team gets the
    /// no-op result instead. A ledger already settled for this round is
    /// left alone.
    async fn commit_team_ledger(
        &self,
        round_id: &str,
        mut result: TeamSettlement,
        config: &SimulationConfig,
    ) -> Result<TeamSettlement> {
        if !result.has_changes() || self.get_ledger(&result.team_id).await?.is_settled_for(round_id) {
            return Ok(result);
        }

        let max_attempts = config.engine.max_write_attempts;
        let mut attempt = 1;

        while result.has_changes() {
            result.staged.settled_round = Some(round_id.to_string());
            match self.repos.ledgers.save(&result.staged, result.before.version).await {
                Ok(saved) => {
                    result.staged = saved;
                    if attempt > 1 {
                        result.incidents.push(RoundIncident::LedgerWriteRetried {
                            team_id: result.team_id.clone(),
                            attempts: attempt,
                        });
                    }
                    break;
                }
                Err(e) if e.is_version_conflict() => {
                    let fresh = self.get_ledger(&result.team_id).await?;
                    if attempt >= max_attempts {
                        error!(team_id = %result.team_id, attempts = attempt, "Ledger write kept conflicting; substituting a no-op");
                        let reason = format!("ledger write conflicted {} times", attempt);
                        result = TeamSettlement::substituted(result.plan, fresh, reason);
                        break;
                    }
                    warn!(team_id = %result.team_id, attempt, "Ledger changed underneath the round; re-running plan");
                    reexecute(&mut result, fresh, &config.validation_rules);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(result)
    }

    /// Commit the round's market state, or pick up the one an earlier
    /// attempt committed, then apply the per-team adjustments. Teams that
    /// missed the deadline and did nothing keep their ledger untouched.
    async fn update_market(
        &self,
        round_id: &str,
        doc: &RoundDocument,
        config: &SimulationConfig,
    ) -> Result<MarketUpdate> {
        let _market = self.market_lock.lock().await;
        let max_attempts = config.engine.max_write_attempts;

        let mut committed = None;
        for attempt in 1..=max_attempts {
            let prior = self.current_market().await?;
            let ledgers = self.participant_ledgers(doc).await?;

            if prior.round_id.as_deref() == Some(round_id) {
                info!(round_id = %round_id, version = prior.version, "Market already committed for this round");
                committed = Some(MarketUpdateEngine::from_committed(round_id, prior, &ledgers, config));
                break;
            }

            let mut update = MarketUpdateEngine::compute(round_id, &prior, &ledgers, config)?;
            match self.repos.market.commit(&update.state, prior.version).await {
                Ok(state) => {
                    update.state = state;
                    committed = Some(update);
                    break;
                }
                Err(e) if e.is_version_conflict() => {
                    warn!(round_id = %round_id, attempt, "Market changed concurrently; recomputing");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let Some(update) = committed else {
            return Err(OrchestratorError::ConcurrentModification {
                collection: SIMULATION.to_string(),
                key: RESERVED_MARKET_KEY.to_string(),
                attempts: max_attempts,
            });
        };

        for adjustment in &update.adjustments {
            let idle = doc
                .settlements
                .get(&adjustment.team_id)
                .is_some_and(TeamSettlement::is_idle_default);
            if idle {
                debug!(round_id = %round_id, team_id = %adjustment.team_id, "No plan and no actions; ledger left as is");
                continue;
            }
            self.apply_adjustment(adjustment, max_attempts).await?;
        }

        self.event_bus.emit(Event::MarketUpdated {
            round_id: round_id.to_string(),
            version: update.state.version,
            events: update.events.iter().map(|e| e.event_id.clone()).collect(),
        });
        Ok(update)
    }

    async fn participant_ledgers(&self, doc: &RoundDocument) -> Result<Vec<Ledger>> {
        let mut ledgers = Vec::with_capacity(doc.round.participants.len());
        for team_id in &doc.round.participants {
            ledgers.push(self.get_ledger(team_id).await?);
        }
        Ok(ledgers)
    }

    async fn apply_adjustment(
        &self,
        adjustment: &airline_core::LedgerAdjustment,
        max_attempts: u32,
    ) -> Result<()> {
        for _ in 0..max_attempts {
            let mut ledger = self.get_ledger(&adjustment.team_id).await?;
            if ledger.has_market_adjustment_for(&adjustment.round_id) {
                return Ok(());
            }
            let expected = ledger.version;
            ledger.apply_market_adjustment(adjustment);
            match self.repos.ledgers.save(&ledger, expected).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(OrchestratorError::ConcurrentModification {
            collection: db::AIRLINES.to_string(),
            key: adjustment.team_id.clone(),
            attempts: max_attempts,
        })
    }

    async fn evaluate_team(
        &self,
        round_id: &str,
        result: &TeamSettlement,
        update: &MarketUpdate,
        config: &SimulationConfig,
    ) -> Result<EvaluationRecord> {
        let after = self.get_ledger(&result.team_id).await?;
        let input = EvaluationInput {
            round_id,
            before: &result.before,
            after: &after,
            approved: &result.approved,
            rejected: &result.rejected,
            plan_source: &result.plan_source,
            budget_claim: result.plan.total_budget_claim,
            cash_spent: result.cash_spent,
            events: &update.events,
            advisory_notes: &result.advisory_notes,
            incidents: &result.incidents,
        };
        let record = EvaluationEngine::evaluate(&input, &config.scoring);

        let record = match self.repos.feedback.create(&record).await {
            Ok(record) => record,
            Err(DbError::AlreadyExists { .. }) => {
                warn!(round_id = %round_id, team_id = %result.team_id, "Evaluation already recorded; keeping the first");
                self.get_evaluation(&result.team_id, round_id).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.event_bus.emit(Event::EvaluationRecorded {
            round_id: round_id.to_string(),
            team_id: result.team_id.clone(),
            score: record.score,
        });
        Ok(record)
    }
}

fn starting_cash(config: &SimulationConfig) -> Result<Money> {
    Money::from_float(config.starting_cash).ok_or_else(|| {
        OrchestratorError::InvalidConfig(format!("starting_cash {} is not representable", config.starting_cash))
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("pipeline panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("pipeline panicked: {}", s)
    } else {
        "pipeline panicked".to_string()
    }
}
