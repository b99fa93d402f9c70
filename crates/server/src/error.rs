use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Engine(OrchestratorError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Engine(err) => match err {
                OrchestratorError::Schema(_) => (StatusCode::BAD_REQUEST, "schema_error"),
                OrchestratorError::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
                OrchestratorError::TeamNotFound(_)
                | OrchestratorError::RoundNotFound(_)
                | OrchestratorError::MarketNotAvailable(_)
                | OrchestratorError::EvaluationNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                OrchestratorError::NotParticipant { .. } => (StatusCode::FORBIDDEN, "not_participant"),
                OrchestratorError::DuplicateSubmission { .. } => {
                    (StatusCode::CONFLICT, "duplicate_submission")
                }
                OrchestratorError::IntakeClosed(_) => (StatusCode::CONFLICT, "intake_closed"),
                OrchestratorError::IntakeStillOpen(_) => (StatusCode::CONFLICT, "intake_open"),
                OrchestratorError::TeamAlreadyRegistered(_)
                | OrchestratorError::RoundAlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
                OrchestratorError::RoundActive(_)
                | OrchestratorError::NoTeams
                | OrchestratorError::RoundAborted(_)
                | OrchestratorError::AbortNotAllowed { .. }
                | OrchestratorError::InvalidTransition { .. } => (StatusCode::CONFLICT, "conflict"),
                OrchestratorError::ConcurrentModification { .. } => {
                    (StatusCode::CONFLICT, "concurrent_modification")
                }
                OrchestratorError::BarrierTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "barrier_timeout"),
                OrchestratorError::MarketInvariant(_)
                | OrchestratorError::PipelineFailed(_)
                | OrchestratorError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = match self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => msg,
            AppError::Engine(OrchestratorError::Database(err)) => {
                tracing::error!("Database error: {:?}", err);
                "Database error occurred".to_string()
            }
            AppError::Engine(err) => {
                if status.is_server_error() {
                    tracing::error!(fatal = err.is_fatal(), "Engine error: {}", err);
                }
                err.to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Engine(err)
    }
}
