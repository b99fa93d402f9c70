use anyhow::Context;
use server::config::load_or_default;
use server::{create_router, state::AppState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DATABASE_URL: &str = "sqlite:airline-sim.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let config_path = std::env::var("SIMULATION_CONFIG").ok().map(PathBuf::from);
    let advisor_url = std::env::var("ADVISOR_URL").ok();

    let config = load_or_default(config_path.as_deref()).await?;

    let pool = db::create_pool(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    db::run_migrations(&pool).await?;

    let state = AppState::new(pool, config, advisor_url.as_deref())?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
