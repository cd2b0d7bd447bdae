use axum::http::StatusCode;
use serde_json::json;

use crate::helpers::{assert_close, parse_id, revenue_and_eps, TestApp};

#[tokio::test]
async fn full_competition_flow_ranks_and_updates_stats() {
    let app = TestApp::new().await;
    let alice = app.create_user("alice").await;
    let bob = app.create_user("bob").await;
    let (competition_id, metrics) = app.create_competition("ACME", revenue_and_eps()).await;
    let (revenue, eps) = (metrics[0], metrics[1]);

    let (status, _) = app.set_status(competition_id, "OPEN").await;
    assert_eq!(status, StatusCode::OK);

    let (status, prediction) = app
        .predict(competition_id, alice, &[(revenue, 95.0), (eps, 2.0)], true)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", prediction);
    assert!(prediction["total_score"].is_null());
    assert!(prediction["rank"].is_null());

    let (status, _) = app
        .predict(competition_id, bob, &[(revenue, 110.0), (eps, 2.2)], false)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, leaderboard) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", competition_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leaderboard["is_scored"], json!(false));
    assert_eq!(leaderboard["entries"], json!([]));

    let (status, _) = app.set_status(competition_id, "CLOSED").await;
    assert_eq!(status, StatusCode::OK);

    let (status, detail) = app
        .submit_results(competition_id, &[(revenue, 100.0), (eps, 2.0)])
        .await;
    assert_eq!(status, StatusCode::OK, "{}", detail);
    assert_eq!(detail["status"], json!("SCORING"));

    let (_, leaderboard) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", competition_id))
        .await;
    assert_eq!(leaderboard["status"], json!("SCORING"));
    assert_eq!(leaderboard["is_scored"], json!(false));
    assert_eq!(leaderboard["entries"], json!([]));

    let (status, summary) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["scored"], json!(2));

    let (status, leaderboard) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", competition_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leaderboard["is_scored"], json!(true));
    assert_eq!(leaderboard["status"], json!("COMPLETED"));
    let entries = leaderboard["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(parse_id(&entries[0]["user_id"]), alice);
    assert_eq!(entries[0]["rank"], json!(1));
    assert_close(&entries[0]["total_score"], 2.5);
    assert_eq!(entries[0]["values"].as_array().unwrap().len(), 2);
    assert_eq!(parse_id(&entries[1]["user_id"]), bob);
    assert_eq!(entries[1]["rank"], json!(2));
    assert_close(&entries[1]["total_score"], 10.0);
    // private predictions hide their values
    assert!(entries[1]["values"].is_null());

    let (status, rank) = app
        .get(&format!(
            "/api/v1/competitions/{}/users/{}/rank",
            competition_id, bob
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rank["rank"], json!(2));
    assert_eq!(rank["total_participants"], json!(2));

    let (_, prediction) = app
        .get(&format!(
            "/api/v1/competitions/{}/predictions/{}",
            competition_id, alice
        ))
        .await;
    assert_eq!(prediction["rank"], json!(1));
    let errors: Vec<f64> = prediction["values"]
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value["error"].as_f64().unwrap())
        .collect();
    assert_eq!(errors.len(), 2);
    assert!((errors[0] - 5.0).abs() < 1e-9);
    assert!(errors[1].abs() < 1e-9);

    let (_, alice_profile) = app.get(&format!("/api/v1/users/{}", alice)).await;
    assert_eq!(alice_profile["total_predictions"], json!(1));
    assert_eq!(alice_profile["total_wins"], json!(1));
    assert_close(&alice_profile["average_score"], 2.5);

    let (_, bob_profile) = app.get(&format!("/api/v1/users/{}", bob)).await;
    assert_eq!(bob_profile["total_predictions"], json!(1));
    assert_eq!(bob_profile["total_wins"], json!(0));
    assert_close(&bob_profile["average_score"], 10.0);

    let (status, global) = app.get("/api/v1/leaderboard").await;
    assert_eq!(status, StatusCode::OK);
    let global = global.as_array().unwrap();
    assert_eq!(global.len(), 2);
    assert_eq!(parse_id(&global[0]["id"]), alice);
    assert_eq!(global[0]["position"], json!(1));

    let (status, stats) = app.get("/api/v1/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_users"], json!(2));
    assert_eq!(stats["total_competitions"], json!(1));
    assert_eq!(stats["active_competitions"], json!(0));
    assert_eq!(stats["total_predictions"], json!(2));
}

#[tokio::test]
async fn scoring_twice_is_rejected_and_stats_are_unchanged() {
    let app = TestApp::new().await;
    let user = app.create_user("repeat_scorer").await;
    let (competition_id, metrics) = app.create_competition("INIT", revenue_and_eps()).await;

    app.set_status(competition_id, "OPEN").await;
    app.predict(competition_id, user, &[(metrics[0], 80.0), (metrics[1], 1.0)], true)
        .await;
    app.set_status(competition_id, "CLOSED").await;
    app.submit_results(competition_id, &[(metrics[0], 100.0), (metrics[1], 1.0)])
        .await;

    let (status, _) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::OK);
    let (_, before) = app.get(&format!("/api/v1/users/{}", user)).await;

    let (status, body) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already been scored"));

    let (_, after) = app.get(&format!("/api/v1/users/{}", user)).await;
    assert_eq!(before["total_predictions"], after["total_predictions"]);
    assert_eq!(before["total_wins"], after["total_wins"]);
    assert_eq!(before["average_score"], after["average_score"]);
    assert_eq!(after["total_predictions"], json!(1));

    // a scored competition no longer takes results either
    let (status, _) = app
        .submit_results(competition_id, &[(metrics[0], 90.0)])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_scoring_requests_score_once() {
    let app = TestApp::new().await;
    let user = app.create_user("racer").await;
    let (competition_id, metrics) = app.create_competition("RACE", revenue_and_eps()).await;

    app.set_status(competition_id, "OPEN").await;
    app.predict(competition_id, user, &[(metrics[0], 50.0), (metrics[1], 0.5)], true)
        .await;
    app.set_status(competition_id, "CLOSED").await;
    app.submit_results(competition_id, &[(metrics[0], 50.0), (metrics[1], 0.5)])
        .await;

    let ((first, _), (second, _)) =
        futures::future::join(app.score(competition_id), app.score(competition_id)).await;
    let mut statuses = vec![first, second];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let (_, profile) = app.get(&format!("/api/v1/users/{}", user)).await;
    assert_eq!(profile["total_predictions"], json!(1));
    assert_eq!(profile["total_wins"], json!(1));
}

#[tokio::test]
async fn incomplete_results_block_scoring() {
    let app = TestApp::new().await;
    let user = app.create_user("partial").await;
    let (competition_id, metrics) = app.create_competition("PART", revenue_and_eps()).await;

    app.set_status(competition_id, "OPEN").await;
    app.predict(competition_id, user, &[(metrics[0], 10.0), (metrics[1], 1.0)], true)
        .await;
    app.set_status(competition_id, "CLOSED").await;

    let (status, body) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("results must be submitted"));

    app.submit_results(competition_id, &[(metrics[0], 12.0)]).await;
    let (status, body) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["missing_metrics"], json!([metrics[1]]));

    let (_, profile) = app.get(&format!("/api/v1/users/{}", user)).await;
    assert_eq!(profile["total_predictions"], json!(0));
    assert!(profile["average_score"].is_null());
}

#[tokio::test]
async fn tied_predictions_share_rank_with_gap() {
    let app = TestApp::new().await;
    let first = app.create_user("tie_one").await;
    let second = app.create_user("tie_two").await;
    let third = app.create_user("tie_three").await;
    let (competition_id, metrics) = app
        .create_competition(
            "TIES",
            json!([{ "name": "Revenue", "code": "REVENUE" }]),
        )
        .await;

    app.set_status(competition_id, "OPEN").await;
    app.predict(competition_id, first, &[(metrics[0], 90.0)], true)
        .await;
    app.predict(competition_id, second, &[(metrics[0], 110.0)], true)
        .await;
    app.predict(competition_id, third, &[(metrics[0], 150.0)], true)
        .await;
    app.set_status(competition_id, "CLOSED").await;
    app.submit_results(competition_id, &[(metrics[0], 100.0)]).await;
    let (status, _) = app.score(competition_id).await;
    assert_eq!(status, StatusCode::OK);

    let (_, leaderboard) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", competition_id))
        .await;
    let entries = leaderboard["entries"].as_array().unwrap();
    let ranks: Vec<u64> = entries
        .iter()
        .map(|entry| entry["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 1, 3]);
    // submission order breaks display ties
    assert_eq!(parse_id(&entries[0]["user_id"]), first);
    assert_eq!(parse_id(&entries[1]["user_id"]), second);

    let (_, second_profile) = app.get(&format!("/api/v1/users/{}", second)).await;
    assert_eq!(second_profile["total_wins"], json!(1));
}
