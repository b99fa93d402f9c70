use airline_core::SimulationConfig;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use server::{create_router, state::AppState};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_with_advisor(advisor_url: Option<&str>) -> (TestServer, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = db::create_pool(&db_url).await.expect("Failed to create pool");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let mut config = SimulationConfig::default();
    config.engine.barrier_ceiling_ms = 5_000;
    config.engine.advisory_timeout_ms = 1_000;

    let state = AppState::new(pool, config, advisor_url).expect("Failed to build state");
    let server = TestServer::new(create_router(state)).expect("Failed to create test server");

    (server, temp_dir)
}

async fn setup_test_server() -> (TestServer, TempDir) {
    setup_with_advisor(None).await
}

async fn register(server: &TestServer, team_id: &str) {
    server
        .post("/api/teams")
        .json(&json!({"team_id": team_id, "name": format!("Airline {}", team_id)}))
        .await
        .assert_status(StatusCode::CREATED);
}

async fn open(server: &TestServer, round_id: &str) {
    server
        .post("/api/rounds")
        .json(&json!({"round_id": round_id, "duration_secs": 3600}))
        .await
        .assert_status(StatusCode::CREATED);
}

fn plan(team_id: &str, round_id: &str) -> Value {
    json!({
        "team_id": team_id,
        "semester": round_id,
        "total_budget": 1100000.0,
        "actions": [
            {"action_type": "purchase_aircraft", "description": "A320", "cost": 800000.0, "parameters": {}},
            {"action_type": "add_route", "description": "PRG-LHR", "cost": 300000.0, "parameters": {"route": "PRG-LHR"}}
        ]
    })
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }
}

mod teams {
    use super::*;

    #[tokio::test]
    async fn test_register_team_returns_starting_ledger() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/teams")
            .json(&json!({"team_id": "T1", "name": "Czech Wings"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["team_id"], "T1");
        assert_eq!(body["fleet_size"], 0);
        assert_eq!(body["reputation"], 50.0);
        assert_eq!(body["version"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;

        let response = server
            .post("/api/teams")
            .json(&json!({"team_id": "T1", "name": "Again"}))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "already_exists");
    }

    #[tokio::test]
    async fn test_invalid_team_id_is_bad_request() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/teams")
            .json(&json!({"team_id": "market_state", "name": "Sneaky"}))
            .await;

        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn test_feedback_history() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        register(&server, "T2").await;

        for round_id in ["R1", "R2"] {
            open(&server, round_id).await;
            server
                .post(&format!("/api/rounds/{}/plans", round_id))
                .json(&plan("T1", round_id))
                .await
                .assert_status(StatusCode::CREATED);
            server
                .post(&format!("/api/rounds/{}/close", round_id))
                .await
                .assert_status_ok();
            server
                .post(&format!("/api/rounds/{}/advance", round_id))
                .await
                .assert_status_ok();
        }

        let response = server.get("/api/airlines/T1/feedback").await;
        response.assert_status_ok();
        let history: Value = response.json();
        let rounds: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["round_id"].as_str().unwrap())
            .collect();
        assert_eq!(rounds, vec!["R1", "R2"]);

        let t2: Value = server.get("/api/airlines/T2/feedback").await.json();
        assert_eq!(t2[0]["plan_source"]["source"], "default");

        server
            .get("/api/airlines/T9/feedback")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_list_and_get_airlines() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T2").await;
        register(&server, "T1").await;

        let response = server.get("/api/airlines").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["team_id"], "T1");

        server.get("/api/airlines/T2").await.assert_status_ok();
        server.get("/api/airlines/T9").await.assert_status_not_found();
    }
}

mod rounds {
    use super::*;

    #[tokio::test]
    async fn test_full_round() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        register(&server, "T2").await;
        open(&server, "R1").await;

        for team in ["T1", "T2"] {
            let response = server.post("/api/rounds/R1/plans").json(&plan(team, "R1")).await;
            response.assert_status(StatusCode::CREATED);
            let ack: Value = response.json();
            assert_eq!(ack["action_count"], 2);
            assert_eq!(ack["preview"]["approved"].as_array().unwrap().len(), 1);
        }

        let response = server.post("/api/rounds/R1/advance").await;
        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["round"]["status"], "closed");
        assert_eq!(result["market"]["version"], 1);
        assert_eq!(result["evaluations"].as_array().unwrap().len(), 2);

        let feedback = server.get("/api/rounds/R1/feedback/T1").await;
        feedback.assert_status_ok();
        let record: Value = feedback.json();
        assert_eq!(record["reconsider"][0]["reason"], "BudgetExceeded");
        assert_eq!(record["plan_source"]["source"], "submitted");

        let market: Value = server.get("/api/rounds/R1/market").await.json();
        let current: Value = server.get("/api/market").await.json();
        assert_eq!(market["version"], current["version"]);

        let ledger: Value = server.get("/api/airlines/T1").await.json();
        assert_eq!(ledger["fleet_size"], 1);
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_bad_request() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;

        for secs in [9_000_000_000_000_000_000_i64, 9_000_000_000_000] {
            let response = server
                .post("/api/rounds")
                .json(&json!({"round_id": "R1", "duration_secs": secs}))
                .await;
            response.assert_status_bad_request();
            let body: Value = response.json();
            assert_eq!(body["error"], "bad_request");
        }

        server.get("/api/rounds/R1").await.assert_status_not_found();
        open(&server, "R1").await;
    }

    #[tokio::test]
    async fn test_submission_status_during_intake() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        register(&server, "T2").await;
        open(&server, "R1").await;

        let before: Value = server.get("/api/rounds/R1/submissions").await.json();
        assert_eq!(before["submitted"].as_array().unwrap().len(), 0);
        assert_eq!(before["missing"], json!(["T1", "T2"]));

        server
            .post("/api/rounds/R1/plans")
            .json(&plan("T1", "R1"))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.get("/api/rounds/R1/submissions").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "collecting");
        assert_eq!(body["intake_open"], true);
        assert_eq!(body["submitted"][0]["team_id"], "T1");
        assert_eq!(body["submitted"][0]["action_count"], 2);
        assert_eq!(body["missing"], json!(["T2"]));

        server
            .get("/api/rounds/R9/submissions")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_overflowing_costs_are_rejected_and_not_stored() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        let huge = json!({"action_type": "staff_training", "description": "crew", "cost": 9.0e16});
        let response = server
            .post("/api/rounds/R1/plans")
            .json(&json!({
                "team_id": "T1",
                "semester": "R1",
                "total_budget": 0.0,
                "actions": [huge.clone(), huge]
            }))
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"], "schema_error");

        let submissions: Value = server.get("/api/rounds/R1/submissions").await.json();
        assert_eq!(submissions["missing"], json!(["T1"]));
        server
            .post("/api/rounds/R1/plans")
            .json(&plan("T1", "R1"))
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_schema_error_is_bad_request() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        let response = server
            .post("/api/rounds/R1/plans")
            .json(&json!({"team_id": "T1", "semester": "R1", "total_budget": "lots", "actions": []}))
            .await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"], "schema_error");
    }

    #[tokio::test]
    async fn test_semester_must_match_round() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        let response = server.post("/api/rounds/R1/plans").json(&plan("T1", "R2")).await;
        response.assert_status_bad_request();
    }

    #[tokio::test]
    async fn test_duplicate_submission_conflicts() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        server
            .post("/api/rounds/R1/plans")
            .json(&plan("T1", "R1"))
            .await
            .assert_status(StatusCode::CREATED);
        let response = server.post("/api/rounds/R1/plans").json(&plan("T1", "R1")).await;

        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "duplicate_submission");
    }

    #[tokio::test]
    async fn test_advance_before_deadline_conflicts() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        register(&server, "T2").await;
        open(&server, "R1").await;
        server.post("/api/rounds/R1/plans").json(&plan("T1", "R1")).await;

        let response = server.post("/api/rounds/R1/advance").await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "intake_open");

        server.post("/api/rounds/R1/close").await.assert_status_ok();
        let late = server.post("/api/rounds/R1/plans").json(&plan("T2", "R1")).await;
        late.assert_status(StatusCode::CONFLICT);

        let response = server.post("/api/rounds/R1/advance").await;
        response.assert_status_ok();
        let feedback: Value = server.get("/api/rounds/R1/feedback/T2").await.json();
        assert_eq!(feedback["plan_source"]["source"], "default");
    }

    #[tokio::test]
    async fn test_abort_round() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        let response = server
            .post("/api/rounds/R1/abort")
            .json(&json!({"reason": "wrong scenario"}))
            .await;
        response.assert_status_ok();
        let round: Value = response.json();
        assert_eq!(round["status"], "aborted");

        server
            .post("/api/rounds/R1/advance")
            .await
            .assert_status(StatusCode::CONFLICT);
        server
            .get("/api/rounds/R1/market")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_one_active_round_at_a_time() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        open(&server, "R1").await;

        let response = server
            .post("/api/rounds")
            .json(&json!({"round_id": "R2"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        server.get("/api/rounds/R2").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_open_round_without_teams() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/rounds")
            .json(&json!({"round_id": "R1"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
    }
}

mod simulation {
    use super::*;

    #[tokio::test]
    async fn test_status_and_reset() {
        let (server, _temp_dir) = setup_test_server().await;
        register(&server, "T1").await;
        register(&server, "T2").await;
        open(&server, "R1").await;
        server.post("/api/rounds/R1/plans").json(&plan("T1", "R1")).await;
        server.post("/api/rounds/R1/plans").json(&plan("T2", "R1")).await;

        server.post("/api/reset").await.assert_status(StatusCode::CONFLICT);

        server.post("/api/rounds/R1/advance").await.assert_status_ok();

        let status: Value = server.get("/api/status").await.json();
        assert_eq!(status["teams"].as_array().unwrap().len(), 2);
        assert_eq!(status["rounds_closed"], 1);
        assert!(status["active_round"].is_null());
        assert!(status["class_averages"]["latest_score"].is_number());

        let response = server.post("/api/reset").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["teams"], 2);

        let ledger: Value = server.get("/api/airlines/T1").await.json();
        assert_eq!(ledger["fleet_size"], 0);
        server.get("/api/rounds/R1").await.assert_status_not_found();
        let market: Value = server.get("/api/market").await.json();
        assert_eq!(market["version"], 0);
    }

    #[tokio::test]
    async fn test_start_round_set() {
        let (server, _temp_dir) = setup_test_server().await;

        let response = server
            .post("/api/round-sets")
            .json(&json!({"starting_cash": 250000.0, "engine": {"seed": 99}}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["round_set_id"].is_string());

        let response = server
            .post("/api/teams")
            .json(&json!({"team_id": "T1", "name": "Small"}))
            .await;
        let ledger: Value = response.json();
        assert_eq!(ledger["cash"], 25_000_000);

        let bad = server
            .post("/api/round-sets")
            .json(&json!({"engine": {"max_write_attempts": 0}}))
            .await;
        bad.assert_status_bad_request();
    }
}

mod advisory {
    use super::*;

    #[tokio::test]
    async fn test_advisor_notes_reach_feedback() {
        let advisor = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"verdict": "implausible", "confidence": 0.9})),
            )
            .mount(&advisor)
            .await;

        let (server, _temp_dir) = setup_with_advisor(Some(&advisor.uri())).await;
        register(&server, "T1").await;
        open(&server, "R1").await;
        server.post("/api/rounds/R1/plans").json(&plan("T1", "R1")).await;
        server.post("/api/rounds/R1/advance").await.assert_status_ok();

        let record: Value = server.get("/api/rounds/R1/feedback/T1").await.json();
        assert!(record["feedback_text"].as_str().unwrap().contains("Advisor:"));
        assert_eq!(record["approved_actions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_advisor_does_not_block_round() {
        let advisor = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&advisor)
            .await;

        let (server, _temp_dir) = setup_with_advisor(Some(&advisor.uri())).await;
        register(&server, "T1").await;
        open(&server, "R1").await;
        server.post("/api/rounds/R1/plans").json(&plan("T1", "R1")).await;

        let response = server.post("/api/rounds/R1/advance").await;
        response.assert_status_ok();
        let result: Value = response.json();
        let incidents = result["round"]["incidents"].as_array().unwrap();
        assert!(incidents.iter().any(|i| i["kind"] == "advisory_timeout"));
    }
}
