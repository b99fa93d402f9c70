mod feedback_repository;
mod ledger_repository;
mod market_repository;
mod plan_repository;
mod round_repository;

pub use feedback_repository::*;
pub use ledger_repository::*;
pub use market_repository::*;
pub use plan_repository::*;
pub use round_repository::*;

use crate::error::DbError;
use crate::store::{DocumentStore, SIMULATION};
use std::sync::Arc;

/// One repository per collection, sharing a store.
#[derive(Clone)]
pub struct Repositories {
    pub ledgers: LedgerRepository,
    pub plans: PlanRepository,
    pub rounds: RoundRepository,
    pub market: MarketRepository,
    pub feedback: FeedbackRepository,
    store: Arc<dyn DocumentStore>,
}

impl Repositories {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            ledgers: LedgerRepository::new(store.clone()),
            plans: PlanRepository::new(store.clone()),
            rounds: RoundRepository::new(store.clone()),
            market: MarketRepository::new(store.clone()),
            feedback: FeedbackRepository::new(store.clone()),
            store,
        }
    }

    /// Drop rounds, plans, feedback and the market. Ledgers are kept.
    pub async fn clear_round_data(&self) -> Result<(), DbError> {
        self.plans.delete_all().await?;
        self.feedback.delete_all().await?;
        self.store.delete_collection(SIMULATION).await?;
        Ok(())
    }
}
