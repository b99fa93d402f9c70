pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/teams", post(routes::register_team))
        .route("/api/airlines", get(routes::list_airlines))
        .route("/api/airlines/{team_id}", get(routes::get_airline))
        .route(
            "/api/airlines/{team_id}/feedback",
            get(routes::get_feedback_history),
        )
        .route(
            "/api/rounds",
            get(routes::list_rounds).post(routes::open_round),
        )
        .route("/api/rounds/{round_id}", get(routes::get_round))
        .route("/api/rounds/{round_id}/plans", post(routes::submit_plan))
        .route(
            "/api/rounds/{round_id}/submissions",
            get(routes::get_submissions),
        )
        .route("/api/rounds/{round_id}/close", post(routes::close_intake))
        .route("/api/rounds/{round_id}/advance", post(routes::advance_round))
        .route("/api/rounds/{round_id}/abort", post(routes::abort_round))
        .route("/api/rounds/{round_id}/market", get(routes::get_round_market))
        .route(
            "/api/rounds/{round_id}/feedback/{team_id}",
            get(routes::get_feedback),
        )
        .route("/api/market", get(routes::get_market))
        .route("/api/status", get(routes::get_status))
        .route("/api/reset", post(routes::reset_simulation))
        .route("/api/round-sets", post(routes::start_round_set))
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
