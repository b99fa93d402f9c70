use airline_core::{EvaluationRecord, MarketState, Round};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use orchestrator::{RoundResult, RoundSubmissions, SubmissionAck};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_INTAKE_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
pub struct OpenRoundRequest {
    pub round_id: String,
    /// Absolute intake deadline. Takes precedence over `duration_secs`.
    pub deadline: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AbortRequest {
    pub reason: Option<String>,
}

pub async fn open_round(
    State(state): State<AppState>,
    Json(payload): Json<OpenRoundRequest>,
) -> Result<(StatusCode, Json<Round>), AppError> {
    let deadline = match (payload.deadline, payload.duration_secs) {
        (Some(deadline), _) => deadline,
        (None, Some(secs)) if secs < 0 => {
            return Err(AppError::BadRequest("duration_secs cannot be negative".to_string()))
        }
        (None, secs) => {
            let secs = secs.unwrap_or(DEFAULT_INTAKE_SECS);
            Duration::try_seconds(secs)
                .and_then(|duration| Utc::now().checked_add_signed(duration))
                .ok_or_else(|| {
                    AppError::BadRequest(format!("duration_secs {} is out of range", secs))
                })?
        }
    };

    let round = state.coordinator.open_round(&payload.round_id, deadline).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub async fn list_rounds(State(state): State<AppState>) -> Result<Json<Vec<Round>>, AppError> {
    Ok(Json(state.coordinator.list_rounds().await?))
}

pub async fn get_round(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<Round>, AppError> {
    Ok(Json(state.coordinator.get_round(&round_id).await?))
}

pub async fn submit_plan(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<SubmissionAck>), AppError> {
    match payload.get("semester").and_then(Value::as_str) {
        Some(semester) if semester != round_id => {
            return Err(AppError::BadRequest(format!(
                "Plan is for semester {} but was posted to round {}",
                semester, round_id
            )))
        }
        _ => {}
    }

    let ack = state.coordinator.submit_plan(payload).await?;
    Ok((StatusCode::CREATED, Json(ack)))
}

pub async fn get_submissions(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<RoundSubmissions>, AppError> {
    Ok(Json(state.coordinator.round_submissions(&round_id).await?))
}

pub async fn close_intake(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<Round>, AppError> {
    Ok(Json(state.coordinator.close_intake(&round_id).await?))
}

pub async fn advance_round(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<RoundResult>, AppError> {
    Ok(Json(state.coordinator.advance_round(&round_id).await?))
}

pub async fn abort_round(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
    payload: Option<Json<AbortRequest>>,
) -> Result<Json<Round>, AppError> {
    let reason = payload
        .and_then(|Json(p)| p.reason)
        .unwrap_or_else(|| "aborted by instructor".to_string());
    Ok(Json(state.coordinator.abort_round(&round_id, &reason).await?))
}

pub async fn get_round_market(
    State(state): State<AppState>,
    Path(round_id): Path<String>,
) -> Result<Json<MarketState>, AppError> {
    Ok(Json(state.coordinator.get_market_state(&round_id).await?))
}

pub async fn get_feedback(
    State(state): State<AppState>,
    Path((round_id, team_id)): Path<(String, String)>,
) -> Result<Json<EvaluationRecord>, AppError> {
    Ok(Json(state.coordinator.get_evaluation(&team_id, &round_id).await?))
}
