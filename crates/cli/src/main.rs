mod batch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use db::{Repositories, SqliteDocumentStore};
use events::EventBus;
use orchestrator::{HttpAdvisor, RoundCoordinator};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use server::config::load_or_default;
use server::{create_router, state::AppState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SIM_DIR: &str = ".airline-sim";
const CONFIG_FILE: &str = "config.toml";
const SIMULATION_FILE: &str = "simulation.toml";
const DEFAULT_DB_NAME: &str = "simulation.db";
const DEFAULT_PORT: u16 = 3001;

#[derive(Parser)]
#[command(name = "airline-sim")]
#[command(about = "Turn-based airline simulation round engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .airline-sim/ with a config, the stock simulation settings and a database
    Init,
    /// Run the HTTP API
    Serve {
        /// Overrides the port in config.toml
        #[arg(short, long)]
        port: Option<u16>,

        /// Base URL of an advisory classifier
        #[arg(long)]
        advisor_url: Option<String>,
    },
    /// Play one round from a directory of plan JSON files
    Batch {
        dir: PathBuf,

        /// Round id; defaults to the semester named in the plans
        #[arg(long)]
        round: Option<String>,

        /// Write the round result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the standings
    Status,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimConfig {
    simulation: SimulationInfo,
    server: ServerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct SimulationInfo {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServerConfig {
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    advisor_url: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationInfo {
                name: "airline-sim".to_string(),
            },
            server: ServerConfig {
                port: DEFAULT_PORT,
                advisor_url: None,
            },
        }
    }
}

/// Paths of the simulation directory, falling back to the working directory
/// when it has not been initialized.
struct Workspace {
    config: SimConfig,
    simulation_file: Option<PathBuf>,
    db_path: PathBuf,
}

impl Workspace {
    async fn load() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let sim_dir = cwd.join(SIM_DIR);

        if !sim_dir.exists() {
            println!("No {} directory found; using defaults.", SIM_DIR);
            println!("Run 'airline-sim init' to create one.");
            println!();
            return Ok(Self {
                config: SimConfig::default(),
                simulation_file: None,
                db_path: cwd.join(DEFAULT_DB_NAME),
            });
        }

        let config_path = sim_dir.join(CONFIG_FILE);
        let config: SimConfig = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid {}", config_path.display()))?
        } else {
            SimConfig::default()
        };

        let simulation_file = Some(sim_dir.join(SIMULATION_FILE)).filter(|p| p.exists());

        Ok(Self {
            config,
            simulation_file,
            db_path: sim_dir.join(DEFAULT_DB_NAME),
        })
    }

    fn database_url(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }

    async fn pool(&self) -> Result<SqlitePool> {
        let pool = db::create_pool(&self.database_url())
            .await
            .context("Failed to create database pool")?;
        db::run_migrations(&pool).await?;
        Ok(pool)
    }

    async fn coordinator(&self) -> Result<RoundCoordinator> {
        let config = load_or_default(self.simulation_file.as_deref()).await?;
        let repos = Repositories::new(Arc::new(SqliteDocumentStore::new(self.pool().await?)));
        let mut coordinator = RoundCoordinator::new(repos, EventBus::new(), config)?;
        if let Some(url) = &self.config.server.advisor_url {
            coordinator = coordinator.with_advisor(Arc::new(HttpAdvisor::new(url.as_str())));
        }
        Ok(coordinator)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => init_simulation().await,
        Some(Commands::Serve { port, advisor_url }) => serve(port, advisor_url).await,
        Some(Commands::Batch { dir, round, output }) => {
            run_batch(&dir, round.as_deref(), output.as_deref()).await
        }
        Some(Commands::Status) => status().await,
        None => serve(cli.port, None).await,
    }
}

async fn init_simulation() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let sim_dir = cwd.join(SIM_DIR);

    if sim_dir.exists() {
        println!("Simulation already initialized at {}", sim_dir.display());
        return Ok(());
    }

    println!("Initializing airline simulation in {}", cwd.display());
    tokio::fs::create_dir_all(&sim_dir).await?;

    let name = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("airline-sim")
        .to_string();

    let config = SimConfig {
        simulation: SimulationInfo { name: name.clone() },
        ..Default::default()
    };
    tokio::fs::write(sim_dir.join(CONFIG_FILE), toml::to_string_pretty(&config)?).await?;

    let simulation = airline_core::SimulationConfig::default();
    tokio::fs::write(
        sim_dir.join(SIMULATION_FILE),
        toml::to_string_pretty(&simulation)?,
    )
    .await?;

    let db_path = sim_dir.join(DEFAULT_DB_NAME);
    let pool = db::create_pool(&format!("sqlite:{}", db_path.display())).await?;
    db::run_migrations(&pool).await?;

    println!();
    println!("Initialized simulation '{}'", name);
    println!();
    println!("Created:");
    println!("  {}/", SIM_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  ├── {}", SIMULATION_FILE);
    println!("  └── {}", DEFAULT_DB_NAME);
    println!();
    println!("Next steps:");
    println!("  1. Adjust {}/{} (event catalog, rules, weights)", SIM_DIR, SIMULATION_FILE);
    println!("  2. Run 'airline-sim serve' to start the API");

    Ok(())
}

async fn serve(port: Option<u16>, advisor_url: Option<String>) -> Result<()> {
    let workspace = Workspace::load().await?;
    init_tracing();

    let port = port.unwrap_or(workspace.config.server.port);

    let advisor_url = advisor_url.or_else(|| workspace.config.server.advisor_url.clone());
    let config = load_or_default(workspace.simulation_file.as_deref()).await?;
    tracing::info!("Database: {}", workspace.db_path.display());

    let pool = workspace.pool().await?;
    let state = AppState::new(pool, config, advisor_url.as_deref())?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!();
    println!("Airline simulation - {}", workspace.config.simulation.name);
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Events:      http://localhost:{}/api/events", port);
    if let Some(url) = &advisor_url {
        println!("  Advisor:     {}", url);
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_batch(dir: &Path, round: Option<&str>, output: Option<&Path>) -> Result<()> {
    let workspace = Workspace::load().await?;
    init_tracing();

    let coordinator = workspace.coordinator().await?;
    let report = batch::run_batch(&coordinator, dir, round).await?;

    println!();
    println!("Round {} closed", report.round_id);
    if !report.registered.is_empty() {
        println!("Registered: {}", report.registered.join(", "));
    }
    println!("Submitted:  {}", report.submitted.join(", "));
    for skipped in &report.skipped {
        println!("Skipped:    {} ({})", skipped.file.display(), skipped.reason);
    }

    let market = &report.result.market;
    println!();
    println!(
        "Market v{}: {} passengers, {:?} economy",
        market.version, market.total_passengers, market.economic_conditions
    );
    for event in market.events_for_round(&report.round_id) {
        println!("  • {}", event.description);
    }

    println!();
    let mut evaluations = report.result.evaluations.clone();
    evaluations.sort_by(|a, b| b.score.total_cmp(&a.score));
    for record in &evaluations {
        println!(
            "  {:>6.1}  {:<12} {} approved, {} rejected",
            record.score,
            record.team_id,
            record.approved_actions.len(),
            record.rejected_actions.len()
        );
    }
    println!();

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&report.result)?;
        tokio::fs::write(output, json)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Result written to {}", output.display());
    }

    Ok(())
}

async fn status() -> Result<()> {
    let workspace = Workspace::load().await?;

    if !workspace.db_path.exists() {
        println!(
            "Simulation: {} (database not initialized)",
            workspace.config.simulation.name
        );
        return Ok(());
    }

    let coordinator = workspace.coordinator().await?;
    let status = coordinator.simulation_status().await?;

    println!();
    println!("Simulation: {}", workspace.config.simulation.name);
    println!("Round set:  {}", status.round_set_id);
    println!("Rounds closed: {}", status.rounds_closed);
    if let Some(round) = &status.active_round {
        println!("Active round:  {} ({})", round.round_id, round.status);
    }
    println!();

    if status.teams.is_empty() {
        println!("No teams registered yet.");
    } else {
        println!("Teams ({}):", status.teams.len());
        for team in &status.teams {
            let score = team
                .latest_score
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<12} cash {:>14}  fleet {:>3}  routes {:>3}  rep {:>5.1}  share {:>5.1}%  score {}",
                team.team_id,
                team.cash.to_string(),
                team.fleet_size,
                team.route_count,
                team.reputation,
                team.market_share * 100.0,
                score
            );
        }
        if let Some(leader) = &status.top_performers.market_leader {
            println!();
            println!("Market leader: {}", leader);
        }
    }

    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airline_sim=info,orchestrator=info,server=info,tower_http=info".into()),
        )
        .init();
}
