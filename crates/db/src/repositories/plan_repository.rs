use crate::error::DbError;
use crate::store::{DocumentStore, WriteCondition, PLANS};
use airline_core::{team_round_key, SemesterPlan};
use std::sync::Arc;

/// Submitted plans. A plan is written once and never replaced.
#[derive(Clone)]
pub struct PlanRepository {
    store: Arc<dyn DocumentStore>,
}

impl PlanRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, plan: &SemesterPlan) -> Result<SemesterPlan, DbError> {
        self.store
            .put(
                PLANS,
                &team_round_key(&plan.team_id, &plan.round_id),
                &serde_json::to_value(plan)?,
                WriteCondition::Absent,
            )
            .await?;
        Ok(plan.clone())
    }

    pub async fn find(&self, team_id: &str, round_id: &str) -> Result<Option<SemesterPlan>, DbError> {
        self.store
            .get(PLANS, &team_round_key(team_id, round_id))
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn find_by_round(&self, round_id: &str) -> Result<Vec<SemesterPlan>, DbError> {
        let plans = self
            .store
            .list(PLANS)
            .await?
            .into_iter()
            .map(|doc| doc.decode::<SemesterPlan>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(plans.into_iter().filter(|p| p.round_id == round_id).collect())
    }

    pub async fn delete_all(&self) -> Result<u64, DbError> {
        self.store.delete_collection(PLANS).await
    }
}
