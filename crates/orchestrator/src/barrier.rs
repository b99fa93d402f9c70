//! Counting barrier joining the per-team pipelines of a round.

use airline_core::TeamId;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};

/// Collects exactly one result per expected team and releases the waiter
/// once all of them have arrived.
pub struct RoundBarrier<T> {
    round_id: String,
    expected: BTreeSet<TeamId>,
    results: Mutex<BTreeMap<TeamId, T>>,
    arrived: watch::Sender<usize>,
}

impl<T> RoundBarrier<T> {
    pub fn new(round_id: impl Into<String>, expected: BTreeSet<TeamId>) -> Self {
        let (arrived, _) = watch::channel(0);
        Self {
            round_id: round_id.into(),
            expected,
            results: Mutex::new(BTreeMap::new()),
            arrived,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn arrived(&self) -> usize {
        *self.arrived.borrow()
    }

    /// Deposit a team's result. Unknown teams and second arrivals are
    /// ignored and reported as `false`.
    pub async fn arrive(&self, team_id: &str, result: T) -> bool {
        if !self.expected.contains(team_id) {
            warn!(round_id = %self.round_id, team_id = %team_id, "Unexpected team at barrier");
            return false;
        }

        let mut results = self.results.lock().await;
        if results.contains_key(team_id) {
            warn!(round_id = %self.round_id, team_id = %team_id, "Team arrived at barrier twice");
            return false;
        }
        results.insert(team_id.to_string(), result);
        let count = results.len();
        drop(results);

        self.arrived.send_replace(count);
        debug!(
            round_id = %self.round_id,
            team_id = %team_id,
            arrived = count,
            expected = self.expected.len(),
            "Team arrived at barrier"
        );
        true
    }

    /// Block until every expected team has arrived, or fail once `ceiling`
    /// has elapsed.
    pub async fn wait(&self, ceiling: Duration) -> Result<BTreeMap<TeamId, T>> {
        let expected = self.expected.len();
        let mut rx = self.arrived.subscribe();

        let released = tokio::time::timeout(ceiling, rx.wait_for(|count| *count >= expected))
            .await
            .map(|arrived| arrived.is_ok());

        match released {
            Ok(true) => {
                let mut results = self.results.lock().await;
                Ok(std::mem::take(&mut *results))
            }
            _ => Err(OrchestratorError::BarrierTimeout {
                round_id: self.round_id.clone(),
                arrived: self.arrived(),
                expected,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn teams(ids: &[&str]) -> BTreeSet<TeamId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_releases_after_all_arrive() {
        let barrier = Arc::new(RoundBarrier::new("R1", teams(&["T1", "T2"])));

        let slow = barrier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            slow.arrive("T2", 2).await;
        });
        assert!(barrier.arrive("T1", 1).await);

        let results = barrier.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["T2"], 2);
    }

    #[tokio::test]
    async fn test_times_out_on_missing_team() {
        let barrier = RoundBarrier::new("R1", teams(&["T1", "T2"]));
        barrier.arrive("T1", ()).await;

        let err = barrier.wait(Duration::from_millis(20)).await.unwrap_err();
        match err {
            OrchestratorError::BarrierTimeout {
                arrived, expected, ..
            } => {
                assert_eq!(arrived, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ignores_duplicates_and_strangers() {
        let barrier = RoundBarrier::new("R1", teams(&["T1"]));
        assert!(barrier.arrive("T1", 1).await);
        assert!(!barrier.arrive("T1", 2).await);
        assert!(!barrier.arrive("T9", 3).await);
        assert_eq!(barrier.arrived(), 1);

        let results = barrier.wait(Duration::from_millis(20)).await.unwrap();
        assert_eq!(results["T1"], 1);
    }

    #[tokio::test]
    async fn test_empty_barrier_releases_immediately() {
        let barrier: RoundBarrier<()> = RoundBarrier::new("R1", BTreeSet::new());
        assert!(barrier.wait(Duration::from_millis(10)).await.unwrap().is_empty());
    }
}
