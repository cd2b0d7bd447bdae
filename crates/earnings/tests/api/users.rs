use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use crate::helpers::TestApp;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/api/v1/health_check").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_user_starts_with_empty_stats() {
    let app = TestApp::new().await;
    let (status, user) = app
        .post(
            "/api/v1/users",
            json!({ "username": "value_investor", "name": "  Ada  " }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", user);
    assert_eq!(user["username"], json!("value_investor"));
    assert_eq!(user["name"], json!("Ada"));
    assert_eq!(user["total_predictions"], json!(0));
    assert_eq!(user["total_wins"], json!(0));
    assert!(user["average_score"].is_null());

    let (status, fetched) = app
        .get(&format!("/api/v1/users/{}", user["id"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], user["id"]);
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let app = TestApp::new().await;
    app.create_user("taken_name").await;

    let (status, body) = app
        .post("/api/v1/users", json!({ "username": "taken_name" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("taken_name"));
}

#[tokio::test]
async fn invalid_username_is_rejected() {
    let app = TestApp::new().await;
    for username in ["ab", "has space", "dash-name", ""] {
        let (status, _) = app
            .post("/api/v1/users", json!({ "username": username }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "username {:?}", username);
    }
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app
        .get(&format!("/api/v1/users/{}", Uuid::now_v7()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn global_leaderboard_skips_users_without_scores() {
    let app = TestApp::new().await;
    app.create_user("no_scores_yet").await;

    let (status, leaderboard) = app.get("/api/v1/leaderboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leaderboard, json!([]));
}
