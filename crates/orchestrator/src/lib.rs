//! Round orchestration engine for the airline simulation.

pub mod advisory;
pub mod barrier;
pub mod coordinator;
pub mod error;
pub mod evaluation;
pub mod executor;
pub mod market;
pub mod pipeline;
mod rules;
pub mod state_machine;
pub mod status;
pub mod validator;

pub use advisory::{Advice, AdvisoryClassifier, AdvisoryContext, AdvisoryError, HttpAdvisor, NoAdvisor, Verdict};
pub use coordinator::{RoundCoordinator, RoundResult, SubmissionAck};
pub use error::{OrchestratorError, Result};
pub use evaluation::EvaluationEngine;
pub use executor::{ActionExecutor, ExecutionOutcome};
pub use market::{MarketUpdate, MarketUpdateEngine};
pub use state_machine::RoundStateMachine;
pub use status::{
    ClassAverages, RoundSubmissions, SimulationStatus, SubmittedPlan, TeamSummary, TopPerformers,
};
pub use validator::{PlanValidator, ValidationReport};
