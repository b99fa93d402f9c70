use crate::error::DbError;
use crate::store::{DocumentStore, WriteCondition, AIRLINES};
use airline_core::Ledger;
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerRepository {
    store: Arc<dyn DocumentStore>,
}

impl LedgerRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, ledger: &Ledger) -> Result<Ledger, DbError> {
        let mut stored = ledger.clone();
        stored.version = 1;
        self.store
            .put(
                AIRLINES,
                &stored.team_id,
                &serde_json::to_value(&stored)?,
                WriteCondition::Absent,
            )
            .await?;
        Ok(stored)
    }

    pub async fn find_by_team(&self, team_id: &str) -> Result<Option<Ledger>, DbError> {
        let Some(doc) = self.store.get(AIRLINES, team_id).await? else {
            return Ok(None);
        };
        let mut ledger: Ledger = doc.decode()?;
        ledger.version = doc.version;
        Ok(Some(ledger))
    }

    pub async fn find_all(&self) -> Result<Vec<Ledger>, DbError> {
        self.store
            .list(AIRLINES)
            .await?
            .into_iter()
            .map(|doc| {
                let mut ledger: Ledger = doc.decode()?;
                ledger.version = doc.version;
                Ok(ledger)
            })
            .collect()
    }

    /// Version-checked write. Succeeds only if the stored ledger is still at
    /// `expected_version`; the returned ledger carries the new version.
    pub async fn save(&self, ledger: &Ledger, expected_version: u64) -> Result<Ledger, DbError> {
        let mut stored = ledger.clone();
        stored.version = expected_version + 1;
        let version = self
            .store
            .put(
                AIRLINES,
                &stored.team_id,
                &serde_json::to_value(&stored)?,
                WriteCondition::Version(expected_version),
            )
            .await?;
        stored.version = version;
        Ok(stored)
    }
}
