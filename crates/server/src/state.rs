use crate::routes::sse::{spawn_buffer_writer, EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE};
use airline_core::SimulationConfig;
use db::{Repositories, SqliteDocumentStore};
use events::EventBus;
use orchestrator::{HttpAdvisor, OrchestratorError, RoundCoordinator};
use sqlx::SqlitePool;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RoundCoordinator>,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
}

impl AppState {
    /// Build the engine over a migrated pool. With `advisor_url`, actions
    /// are sent to that HTTP advisor; without it no advice is given.
    pub fn new(
        pool: SqlitePool,
        config: SimulationConfig,
        advisor_url: Option<&str>,
    ) -> Result<Self, OrchestratorError> {
        let event_bus = EventBus::new();
        let repos = Repositories::new(Arc::new(SqliteDocumentStore::new(pool)));
        let mut coordinator = RoundCoordinator::new(repos, event_bus.clone(), config)?;
        if let Some(url) = advisor_url {
            tracing::info!(url = %url, "Using HTTP advisor");
            coordinator = coordinator.with_advisor(Arc::new(HttpAdvisor::new(url)));
        }

        Ok(Self::from_coordinator(Arc::new(coordinator)))
    }

    /// Must be called inside a tokio runtime: the replay buffer is filled by
    /// a spawned task.
    pub fn from_coordinator(coordinator: Arc<RoundCoordinator>) -> Self {
        let event_buffer: SharedEventBuffer =
            Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE)));
        spawn_buffer_writer(coordinator.event_bus(), event_buffer.clone());

        Self {
            event_bus: coordinator.event_bus().clone(),
            event_buffer,
            coordinator,
        }
    }
}
