use airline_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Malformed plan payload; rejected before validation.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Team not found: {0}")]
    TeamNotFound(String),

    #[error("Team already registered: {0}")]
    TeamAlreadyRegistered(String),

    #[error("Round not found: {0}")]
    RoundNotFound(String),

    #[error("Round already exists: {0}")]
    RoundAlreadyExists(String),

    #[error("Round {0} is still active")]
    RoundActive(String),

    #[error("No teams registered")]
    NoTeams,

    #[error("Team {team_id} does not take part in round {round_id}")]
    NotParticipant { team_id: String, round_id: String },

    #[error("Intake for round {0} is closed")]
    IntakeClosed(String),

    #[error("Intake for round {0} is still open")]
    IntakeStillOpen(String),

    #[error("Team {team_id} already submitted a plan for round {round_id}")]
    DuplicateSubmission { team_id: String, round_id: String },

    #[error("Round {round_id} cannot be aborted in status {status}")]
    AbortNotAllowed { round_id: String, status: String },

    #[error("Round {0} was aborted")]
    RoundAborted(String),

    #[error("Market state for round {0} is not available")]
    MarketNotAvailable(String),

    #[error("Evaluation not found for team {team_id} in round {round_id}")]
    EvaluationNotFound { team_id: String, round_id: String },

    /// Not every team pipeline reached the barrier in time.
    #[error("Barrier timeout in round {round_id}: {arrived}/{expected} teams arrived")]
    BarrierTimeout {
        round_id: String,
        arrived: usize,
        expected: usize,
    },

    #[error("Concurrent modification of {collection}/{key} after {attempts} attempts")]
    ConcurrentModification {
        collection: String,
        key: String,
        attempts: u32,
    },

    #[error("Market invariant violated: {0}")]
    MarketInvariant(String),

    #[error("Pipeline failed: {0}")]
    PipelineFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
}

impl OrchestratorError {
    /// Errors that leave the round stuck until an operator steps in.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::BarrierTimeout { .. } | Self::MarketInvariant(_) => true,
            Self::ConcurrentModification { collection, key, .. } => {
                collection == db::SIMULATION && key == airline_core::RESERVED_MARKET_KEY
            }
            _ => false,
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Schema(msg) => Self::Schema(msg),
            CoreError::InvalidId { .. } => Self::Schema(err.to_string()),
            CoreError::InvalidStatusTransition { from, to } => Self::InvalidTransition { from, to },
            CoreError::InvalidConfig(msg) => Self::InvalidConfig(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(OrchestratorError::BarrierTimeout {
            round_id: "R1".to_string(),
            arrived: 1,
            expected: 2,
        }
        .is_fatal());

        assert!(OrchestratorError::ConcurrentModification {
            collection: db::SIMULATION.to_string(),
            key: airline_core::RESERVED_MARKET_KEY.to_string(),
            attempts: 3,
        }
        .is_fatal());

        assert!(!OrchestratorError::ConcurrentModification {
            collection: db::AIRLINES.to_string(),
            key: "T1".to_string(),
            attempts: 3,
        }
        .is_fatal());

        assert!(!OrchestratorError::Schema("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: OrchestratorError = CoreError::schema("missing field").into();
        assert!(matches!(err, OrchestratorError::Schema(msg) if msg == "missing field"));
    }
}
