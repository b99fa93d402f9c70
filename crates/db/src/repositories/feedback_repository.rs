use crate::error::DbError;
use crate::store::{DocumentStore, WriteCondition, FEEDBACK};
use airline_core::{team_round_key, EvaluationRecord};
use std::sync::Arc;

/// Append-only evaluation records.
#[derive(Clone)]
pub struct FeedbackRepository {
    store: Arc<dyn DocumentStore>,
}

impl FeedbackRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, record: &EvaluationRecord) -> Result<EvaluationRecord, DbError> {
        self.store
            .put(
                FEEDBACK,
                &team_round_key(&record.team_id, &record.round_id),
                &serde_json::to_value(record)?,
                WriteCondition::Absent,
            )
            .await?;
        Ok(record.clone())
    }

    pub async fn find(&self, team_id: &str, round_id: &str) -> Result<Option<EvaluationRecord>, DbError> {
        self.store
            .get(FEEDBACK, &team_round_key(team_id, round_id))
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn find_by_round(&self, round_id: &str) -> Result<Vec<EvaluationRecord>, DbError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|r| r.round_id == round_id)
            .collect())
    }

    pub async fn find_by_team(&self, team_id: &str) -> Result<Vec<EvaluationRecord>, DbError> {
        let mut records: Vec<_> = self
            .find_all()
            .await?
            .into_iter()
            .filter(|r| r.team_id == team_id)
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    pub async fn delete_all(&self) -> Result<u64, DbError> {
        self.store.delete_collection(FEEDBACK).await
    }

    async fn find_all(&self) -> Result<Vec<EvaluationRecord>, DbError> {
        self.store
            .list(FEEDBACK)
            .await?
            .into_iter()
            .map(|doc| doc.decode())
            .collect()
    }
}
