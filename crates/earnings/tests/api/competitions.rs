use axum::http::StatusCode;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::helpers::{parse_id, revenue_and_eps, rfc3339, TestApp};

#[tokio::test]
async fn create_competition_returns_upcoming_competition() {
    let app = TestApp::new().await;
    let (competition_id, metrics) = app.create_competition("nflx", revenue_and_eps()).await;
    assert_eq!(metrics.len(), 2);

    let (status, detail) = app
        .get(&format!("/api/v1/competitions/{}", competition_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["ticker"], json!("NFLX"));
    assert_eq!(detail["status"], json!("UPCOMING"));
    assert_eq!(detail["total_predictions"], json!(0));
    assert!(detail["results"].is_null());
    assert_eq!(detail["metrics"][0]["code"], json!("REVENUE"));
    assert_eq!(detail["metrics"][1]["code"], json!("EPS"));
}

#[tokio::test]
async fn duplicate_ticker_period_is_a_conflict() {
    let app = TestApp::new().await;
    app.create_competition("DUPE", revenue_and_eps()).await;

    let now = OffsetDateTime::now_utc();
    let (status, body) = app
        .post(
            "/api/v1/admin/competitions",
            json!({
                "ticker": "dupe",
                "title": "Duplicate",
                "quarter": 3,
                "fiscal_year": 2025,
                "earnings_date": rfc3339(now + Duration::days(7)),
                "submission_open": rfc3339(now),
                "submission_close": rfc3339(now + Duration::days(6)),
                "metrics": revenue_and_eps(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
}

#[tokio::test]
async fn rejects_invalid_metric_definitions() {
    let app = TestApp::new().await;
    let now = OffsetDateTime::now_utc();
    let (status, body) = app
        .post(
            "/api/v1/admin/competitions",
            json!({
                "ticker": "BAD",
                "title": "Negative weights",
                "quarter": 1,
                "fiscal_year": 2026,
                "earnings_date": rfc3339(now + Duration::days(7)),
                "submission_open": rfc3339(now),
                "submission_close": rfc3339(now + Duration::days(6)),
                "metrics": [{ "name": "Revenue", "code": "REVENUE", "weight": -1.0 }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn predictions_only_accepted_while_open() {
    let app = TestApp::new().await;
    let user = app.create_user("early_bird").await;
    let (competition_id, metrics) = app.create_competition("OPEN", revenue_and_eps()).await;
    let values = [(metrics[0], 100.0), (metrics[1], 1.5)];

    let (status, _) = app.predict(competition_id, user, &values, true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.set_status(competition_id, "OPEN").await;
    let (status, first) = app.predict(competition_id, user, &values, true).await;
    assert_eq!(status, StatusCode::OK, "{}", first);

    // resubmitting replaces the earlier prediction
    let (status, second) = app
        .predict(competition_id, user, &[(metrics[0], 120.0), (metrics[1], 1.7)], false)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["is_public"], json!(false));
    assert_eq!(second["values"][0]["value"], json!(120.0));

    let (_, detail) = app
        .get(&format!("/api/v1/competitions/{}", competition_id))
        .await;
    assert_eq!(detail["total_predictions"], json!(1));

    app.set_status(competition_id, "CLOSED").await;
    let (status, _) = app.predict(competition_id, user, &values, true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn prediction_must_reference_competition_metrics() {
    let app = TestApp::new().await;
    let user = app.create_user("stray_metric").await;
    let (competition_id, metrics) = app.create_competition("STRY", revenue_and_eps()).await;
    app.set_status(competition_id, "OPEN").await;

    let (status, _) = app
        .predict(competition_id, user, &[(Uuid::now_v7(), 1.0)], true)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .predict(competition_id, user, &[(metrics[0], 1.0), (metrics[0], 2.0)], true)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .predict(competition_id, Uuid::now_v7(), &[(metrics[0], 1.0)], true)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn leaderboard_is_empty_until_scored() {
    let app = TestApp::new().await;
    let user = app.create_user("patient").await;
    let (competition_id, metrics) = app.create_competition("WAIT", revenue_and_eps()).await;
    app.set_status(competition_id, "OPEN").await;
    app.predict(competition_id, user, &[(metrics[0], 1.0)], true)
        .await;

    let (status, leaderboard) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", competition_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leaderboard["is_scored"], json!(false));
    assert_eq!(leaderboard["status"], json!("OPEN"));
    assert_eq!(leaderboard["entries"], json!([]));

    let (status, _) = app
        .get(&format!(
            "/api/v1/competitions/{}/users/{}/rank",
            competition_id, user
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_competition_is_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::now_v7();

    let (status, body) = app.get(&format!("/api/v1/competitions/{}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = app
        .get(&format!("/api/v1/competitions/{}/leaderboard", missing))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.score(missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_competitions_filters_by_status() {
    let app = TestApp::new().await;
    let (first, _) = app.create_competition("AAA", revenue_and_eps()).await;
    let (second, _) = app.create_competition("BBB", revenue_and_eps()).await;
    app.set_status(second, "OPEN").await;

    let (status, all) = app.get("/api/v1/competitions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, open) = app.get("/api/v1/competitions?status=OPEN").await;
    assert_eq!(status, StatusCode::OK);
    let open = open.as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(parse_id(&open[0]["id"]), second);

    let (_, upcoming) = app.get("/api/v1/competitions?status=UPCOMING").await;
    assert_eq!(parse_id(&upcoming[0]["id"]), first);
}

#[tokio::test]
async fn invalid_status_transition_is_rejected() {
    let app = TestApp::new().await;
    let (competition_id, _) = app.create_competition("SKIP", revenue_and_eps()).await;

    let (status, _) = app.set_status(competition_id, "COMPLETED").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.set_status(competition_id, "CLOSED").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.set_status(competition_id, "OPEN").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("OPEN"));

    // results only after predictions close
    let (status, _) = app.submit_results(competition_id, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn predictions_rejected_after_submission_deadline() {
    let app = TestApp::new().await;
    let user = app.create_user("too_late").await;
    let now = OffsetDateTime::now_utc();
    let (status, body) = app
        .post(
            "/api/v1/admin/competitions",
            json!({
                "ticker": "LATE",
                "title": "Deadline already passed",
                "quarter": 2,
                "fiscal_year": 2025,
                "earnings_date": rfc3339(now + Duration::days(1)),
                "submission_open": rfc3339(now - Duration::days(2)),
                "submission_close": rfc3339(now - Duration::days(1)),
                "metrics": revenue_and_eps(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let competition_id = parse_id(&body["id"]);

    // still OPEN, but the window closed a day ago
    let (status, _) = app.set_status(competition_id, "OPEN").await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = app
        .get(&format!("/api/v1/competitions/{}", competition_id))
        .await;
    let revenue = parse_id(&detail["metrics"][0]["id"]);

    let (status, body) = app
        .predict(competition_id, user, &[(revenue, 100.0)], true)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("submission window"));

    let (_, detail) = app
        .get(&format!("/api/v1/competitions/{}", competition_id))
        .await;
    assert_eq!(detail["total_predictions"], json!(0));
}
