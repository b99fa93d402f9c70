//! Offline round runner: every `*.json` file in a directory is one team's
//! plan, and the whole directory is played as a single round.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use orchestrator::{OrchestratorError, RoundCoordinator, RoundResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Intake window of a batch round. The batch closes intake itself, so this
/// only bounds how long the round could stay open if the run is interrupted.
const BATCH_INTAKE_HOURS: i64 = 1;

#[derive(Debug)]
pub struct SkippedPlan {
    pub file: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct BatchReport {
    pub round_id: String,
    pub submitted: Vec<String>,
    pub registered: Vec<String>,
    pub skipped: Vec<SkippedPlan>,
    pub result: RoundResult,
}

struct LoadedPlan {
    file: PathBuf,
    team_id: String,
    semester: Option<String>,
    payload: Value,
}

async fn load_plans(dir: &Path, skipped: &mut Vec<SkippedPlan>) -> Result<Vec<LoadedPlan>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read plan directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    let mut plans = Vec::with_capacity(files.len());
    for file in files {
        let content = tokio::fs::read_to_string(&file).await?;
        let payload: Value = match serde_json::from_str(&content) {
            Ok(payload) => payload,
            Err(e) => {
                skipped.push(SkippedPlan {
                    file,
                    reason: format!("not valid JSON: {}", e),
                });
                continue;
            }
        };

        let Some(team_id) = payload.get("team_id").and_then(Value::as_str).map(str::to_string) else {
            skipped.push(SkippedPlan {
                file,
                reason: "missing team_id".to_string(),
            });
            continue;
        };
        let semester = payload
            .get("semester")
            .and_then(Value::as_str)
            .map(str::to_string);

        plans.push(LoadedPlan {
            file,
            team_id,
            semester,
            payload,
        });
    }

    Ok(plans)
}

/// Play one round from the plan files in `dir`.
///
/// Teams seen for the first time are registered under their id. Without an
/// explicit `round_id` the round is named after the first plan's semester.
/// Plans that cannot be submitted are reported, and those teams get the
/// default plan.
pub async fn run_batch(
    coordinator: &RoundCoordinator,
    dir: &Path,
    round_id: Option<&str>,
) -> Result<BatchReport> {
    let mut skipped = Vec::new();
    let plans = load_plans(dir, &mut skipped).await?;

    let round_id = match round_id {
        Some(id) => id.to_string(),
        None => match plans.iter().find_map(|p| p.semester.clone()) {
            Some(semester) => semester,
            None => bail!("No round id given and no plan in {} names a semester", dir.display()),
        },
    };

    let mut registered = Vec::new();
    for plan in &plans {
        match coordinator.get_ledger(&plan.team_id).await {
            Ok(_) => {}
            Err(OrchestratorError::TeamNotFound(_)) => {
                match coordinator.register_team(&plan.team_id, &plan.team_id).await {
                    Ok(_) => registered.push(plan.team_id.clone()),
                    Err(OrchestratorError::TeamAlreadyRegistered(_)) => {}
                    Err(e) => warn!(team_id = %plan.team_id, error = %e, "Could not register team"),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    coordinator
        .open_round(&round_id, Utc::now() + Duration::hours(BATCH_INTAKE_HOURS))
        .await
        .with_context(|| format!("Failed to open round {}", round_id))?;

    let mut submitted = Vec::new();
    for plan in plans {
        if plan.semester.as_deref().is_some_and(|s| s != round_id) {
            skipped.push(SkippedPlan {
                file: plan.file,
                reason: format!("plan is for semester {:?}", plan.semester.unwrap_or_default()),
            });
            continue;
        }

        match coordinator.submit_plan(plan.payload).await {
            Ok(ack) => {
                info!(team_id = %ack.team_id, actions = ack.action_count, "Plan submitted");
                submitted.push(ack.team_id);
            }
            Err(e) => {
                warn!(file = %plan.file.display(), error = %e, "Plan rejected");
                skipped.push(SkippedPlan {
                    file: plan.file,
                    reason: e.to_string(),
                });
            }
        }
    }

    coordinator.close_intake(&round_id).await?;
    let result = coordinator.advance_round(&round_id).await?;

    Ok(BatchReport {
        round_id,
        submitted,
        registered,
        skipped,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use airline_core::{PlanSource, RoundStatus, SimulationConfig};
    use db::{Repositories, SqliteDocumentStore};
    use events::EventBus;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn coordinator() -> RoundCoordinator {
        let pool = db::create_pool("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let repos = Repositories::new(Arc::new(SqliteDocumentStore::new(pool)));
        RoundCoordinator::new(repos, EventBus::new(), SimulationConfig::default()).unwrap()
    }

    fn write_plan(dir: &Path, name: &str, plan: &Value) {
        std::fs::write(dir.join(name), serde_json::to_string_pretty(plan).unwrap()).unwrap();
    }

    fn plan(team_id: &str, semester: &str) -> Value {
        json!({
            "team_id": team_id,
            "semester": semester,
            "total_budget": 200000.0,
            "actions": [
                {"action_type": "purchase_aircraft", "description": "ATR 72", "cost": 150000.0}
            ]
        })
    }

    #[tokio::test]
    async fn test_batch_round() {
        let temp_dir = TempDir::new().unwrap();
        write_plan(temp_dir.path(), "t1.json", &plan("T1", "S1"));
        write_plan(temp_dir.path(), "t2.json", &plan("T2", "S1"));
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let coordinator = coordinator().await;
        let report = run_batch(&coordinator, temp_dir.path(), None).await.unwrap();

        assert_eq!(report.round_id, "S1");
        assert_eq!(report.registered, vec!["T1", "T2"]);
        assert_eq!(report.submitted, vec!["T1", "T2"]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.result.round.status, RoundStatus::Closed);
        assert_eq!(report.result.evaluations.len(), 2);
        assert_eq!(coordinator.get_ledger("T1").await.unwrap().fleet_size, 1);
    }

    #[tokio::test]
    async fn test_bad_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write_plan(temp_dir.path(), "a.json", &plan("T1", "S1"));
        write_plan(temp_dir.path(), "b.json", &plan("T2", "S0"));
        std::fs::write(temp_dir.path().join("c.json"), "{ not json").unwrap();

        let coordinator = coordinator().await;
        let report = run_batch(&coordinator, temp_dir.path(), Some("S1")).await.unwrap();

        assert_eq!(report.submitted, vec!["T1"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.result.round.participant_plans["T2"],
            PlanSource::Default { .. }
        ));
    }

    #[tokio::test]
    async fn test_round_id_required() {
        let temp_dir = TempDir::new().unwrap();
        write_plan(
            temp_dir.path(),
            "t1.json",
            &json!({"team_id": "T1", "total_budget": 0.0, "actions": []}),
        );

        let coordinator = coordinator().await;
        assert!(run_batch(&coordinator, temp_dir.path(), None).await.is_err());
    }
}
