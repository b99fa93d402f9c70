use airline_core::{EvaluationRecord, Ledger};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterTeamRequest {
    pub team_id: String,
    pub name: String,
}

pub async fn register_team(
    State(state): State<AppState>,
    Json(payload): Json<RegisterTeamRequest>,
) -> Result<(StatusCode, Json<Ledger>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name cannot be empty".to_string()));
    }

    let ledger = state
        .coordinator
        .register_team(&payload.team_id, payload.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(ledger)))
}

pub async fn list_airlines(State(state): State<AppState>) -> Result<Json<Vec<Ledger>>, AppError> {
    Ok(Json(state.coordinator.list_ledgers().await?))
}

pub async fn get_airline(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<Ledger>, AppError> {
    Ok(Json(state.coordinator.get_ledger(&team_id).await?))
}

pub async fn get_feedback_history(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<EvaluationRecord>>, AppError> {
    Ok(Json(state.coordinator.feedback_history(&team_id).await?))
}
