use airline_core::SimulationConfig;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] airline_core::CoreError),
}

/// Load a simulation config from a `.json` file, or TOML for any other
/// extension. Missing fields take their defaults.
pub async fn load_simulation_config(path: &Path) -> Result<SimulationConfig, ConfigError> {
    let path_str = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let config: SimulationConfig = if is_json {
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path_str.clone(),
            source,
        })?
    } else {
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path_str.clone(),
            source,
        })?
    };

    config.validate()?;
    debug!(path = %path_str, events = config.event_catalog.len(), "Simulation config parsed");
    info!(path = %path_str, seed = config.engine.seed, "Loaded simulation config");
    Ok(config)
}

/// Config file if one is given, defaults otherwise.
pub async fn load_or_default(path: Option<&Path>) -> Result<SimulationConfig, ConfigError> {
    match path {
        Some(path) => load_simulation_config(path).await,
        None => Ok(SimulationConfig::default()),
    }
}
