use airline_core::{MarketState, SimulationConfig};
use axum::extract::State;
use axum::Json;
use orchestrator::SimulationStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub teams: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoundSetResponse {
    pub round_set_id: Uuid,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<SimulationStatus>, AppError> {
    Ok(Json(state.coordinator.simulation_status().await?))
}

pub async fn get_market(State(state): State<AppState>) -> Result<Json<MarketState>, AppError> {
    Ok(Json(state.coordinator.current_market().await?))
}

pub async fn reset_simulation(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    let teams = state.coordinator.reset_simulation().await?;
    Ok(Json(ResetResponse { teams }))
}

pub async fn start_round_set(
    State(state): State<AppState>,
    Json(config): Json<SimulationConfig>,
) -> Result<Json<RoundSetResponse>, AppError> {
    let round_set_id = state.coordinator.start_round_set(config).await?;
    Ok(Json(RoundSetResponse { round_set_id }))
}
