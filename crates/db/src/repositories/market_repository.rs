use crate::error::DbError;
use crate::store::{DocumentStore, WriteCondition, SIMULATION};
use airline_core::{MarketState, RESERVED_MARKET_KEY};
use std::sync::Arc;

/// The current market document, `simulation/market_state`.
#[derive(Clone)]
pub struct MarketRepository {
    store: Arc<dyn DocumentStore>,
}

impl MarketRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn current(&self) -> Result<Option<MarketState>, DbError> {
        let Some(doc) = self.store.get(SIMULATION, RESERVED_MARKET_KEY).await? else {
            return Ok(None);
        };
        let mut market: MarketState = doc.decode()?;
        market.version = doc.version;
        Ok(Some(market))
    }

    /// Replace the current market if it is still at `expected_version`
    /// (0 meaning no market has been written yet).
    pub async fn commit(&self, next: &MarketState, expected_version: u64) -> Result<MarketState, DbError> {
        let mut stored = next.clone();
        stored.version = expected_version + 1;
        let body = serde_json::to_value(&stored)?;

        let condition = if expected_version == 0 {
            WriteCondition::Absent
        } else {
            WriteCondition::Version(expected_version)
        };

        match self
            .store
            .put(SIMULATION, RESERVED_MARKET_KEY, &body, condition)
            .await
        {
            Ok(version) => {
                stored.version = version;
                Ok(stored)
            }
            Err(DbError::AlreadyExists { collection, key }) => {
                let actual = self.current().await?.map(|m| m.version);
                Err(DbError::VersionConflict {
                    collection,
                    key,
                    expected: expected_version,
                    actual,
                })
            }
            Err(e) => Err(e),
        }
    }
}
