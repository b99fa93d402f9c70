use crate::error::DbError;
use crate::models::RoundDocument;
use crate::store::{DocumentStore, WriteCondition, SIMULATION};
use airline_core::RESERVED_MARKET_KEY;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct RoundRepository {
    store: Arc<dyn DocumentStore>,
}

impl RoundRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, doc: &RoundDocument) -> Result<RoundDocument, DbError> {
        let mut stored = doc.clone();
        stored.round.version = 1;
        self.store
            .put(
                SIMULATION,
                &stored.round.round_id,
                &serde_json::to_value(&stored)?,
                WriteCondition::Absent,
            )
            .await?;
        Ok(stored)
    }

    pub async fn find(&self, round_id: &str) -> Result<Option<RoundDocument>, DbError> {
        if round_id == RESERVED_MARKET_KEY {
            return Ok(None);
        }
        let Some(doc) = self.store.get(SIMULATION, round_id).await? else {
            return Ok(None);
        };
        let mut round: RoundDocument = doc.decode()?;
        round.round.version = doc.version;
        Ok(Some(round))
    }

    /// Rounds in creation order.
    pub async fn find_all(&self) -> Result<Vec<RoundDocument>, DbError> {
        let mut rounds = self
            .store
            .list(SIMULATION)
            .await?
            .into_iter()
            .filter(|doc| doc.key != RESERVED_MARKET_KEY)
            .map(|doc| {
                let mut round: RoundDocument = doc.decode()?;
                round.round.version = doc.version;
                Ok(round)
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        rounds.sort_by_key(|r| r.round.created_at);
        Ok(rounds)
    }

    /// Rounds that are neither closed nor aborted.
    pub async fn find_active(&self) -> Result<Vec<RoundDocument>, DbError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|r| !r.round.status.is_terminal())
            .collect())
    }

    /// Version-checked update. On success `doc` carries the new version; on
    /// failure it is left untouched.
    pub async fn save(&self, doc: &mut RoundDocument) -> Result<(), DbError> {
        let expected = doc.round.version;
        let mut next = doc.clone();
        next.round.version = expected + 1;
        next.round.updated_at = Utc::now();

        self.store
            .put(
                SIMULATION,
                &next.round.round_id,
                &serde_json::to_value(&next)?,
                WriteCondition::Version(expected),
            )
            .await?;

        *doc = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_store;
    use airline_core::{Round, RoundStatus};
    use chrono::Duration;
    use uuid::Uuid;

    fn round(id: &str) -> RoundDocument {
        RoundDocument::new(Round::new(
            id,
            Uuid::new_v4(),
            Utc::now() + Duration::minutes(5),
            ["T1".to_string()].into_iter().collect(),
        ))
    }

    #[tokio::test]
    async fn test_create_and_update_round() {
        let repo = RoundRepository::new(setup_store().await);
        let mut doc = repo.create(&round("R1")).await.unwrap();

        doc.round.status = RoundStatus::Validating;
        repo.save(&mut doc).await.unwrap();
        assert_eq!(doc.round.version, 2);

        let found = repo.find("R1").await.unwrap().unwrap();
        assert_eq!(found.round.status, RoundStatus::Validating);
        assert_eq!(found.round.version, 2);
    }

    #[tokio::test]
    async fn test_stale_round_save_is_rejected() {
        let repo = RoundRepository::new(setup_store().await);
        let doc = repo.create(&round("R1")).await.unwrap();

        let mut a = doc.clone();
        let mut b = doc.clone();
        repo.save(&mut a).await.unwrap();
        assert!(repo.save(&mut b).await.unwrap_err().is_version_conflict());
        assert_eq!(b.round.version, 1);
    }

    #[tokio::test]
    async fn test_find_active_skips_terminal_rounds() {
        let repo = RoundRepository::new(setup_store().await);
        let mut closed = repo.create(&round("R1")).await.unwrap();
        closed.round.status = RoundStatus::Closed;
        repo.save(&mut closed).await.unwrap();
        repo.create(&round("R2")).await.unwrap();

        let active = repo.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].round.round_id, "R2");
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }
}
