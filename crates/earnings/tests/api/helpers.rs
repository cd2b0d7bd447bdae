use axum::http::{Method, StatusCode};
use earnings::{app, AppState, DBConnection, DatabasePoolConfig};
use reqwest::Client;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tokio::net::TcpListener;
use uuid::Uuid;

pub struct TestApp {
    address: String,
    client: Client,
}

impl TestApp {
    /// Serves the api on an ephemeral port backed by its own in-memory database
    pub async fn new() -> Self {
        let folder = format!("api-test-{}", Uuid::now_v7());
        let db = DBConnection::new(&folder, "earnings", DatabasePoolConfig::testing())
            .await
            .expect("failed to create test database");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let address = format!(
            "http://{}",
            listener.local_addr().expect("listener has an address")
        );
        let router = app(AppState::new(db), vec![]);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                eprintln!("test server stopped: {}", e);
            }
        });

        Self {
            address,
            client: Client::new(),
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.address, uri));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.expect("failed to send request");
        let status = response.status();
        let bytes = response.bytes().await.expect("failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn create_user(&self, username: &str) -> Uuid {
        let (status, body) = self
            .post("/api/v1/users", json!({ "username": username }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        parse_id(&body["id"])
    }

    /// Creates a competition whose submission window is currently open and
    /// returns its id with the metric ids in display order
    pub async fn create_competition(&self, ticker: &str, metrics: Value) -> (Uuid, Vec<Uuid>) {
        let now = OffsetDateTime::now_utc();
        let (status, body) = self
            .post(
                "/api/v1/admin/competitions",
                json!({
                    "ticker": ticker,
                    "title": format!("{} Q3 2025 earnings", ticker),
                    "quarter": 3,
                    "fiscal_year": 2025,
                    "earnings_date": rfc3339(now + Duration::days(7)),
                    "submission_open": rfc3339(now - Duration::hours(1)),
                    "submission_close": rfc3339(now + Duration::days(6)),
                    "metrics": metrics,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let competition_id = parse_id(&body["id"]);

        let (status, detail) = self
            .get(&format!("/api/v1/competitions/{}", competition_id))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", detail);
        let metric_ids = detail["metrics"]
            .as_array()
            .expect("metrics array")
            .iter()
            .map(|metric| parse_id(&metric["id"]))
            .collect();

        (competition_id, metric_ids)
    }

    pub async fn set_status(&self, competition_id: Uuid, status: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/api/v1/admin/competitions/{}/status", competition_id),
            json!({ "status": status }),
        )
        .await
    }

    pub async fn predict(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
        values: &[(Uuid, f64)],
        is_public: bool,
    ) -> (StatusCode, Value) {
        let values: Vec<Value> = values
            .iter()
            .map(|(metric_id, value)| json!({ "metric_id": metric_id, "value": value }))
            .collect();
        self.put(
            &format!(
                "/api/v1/competitions/{}/predictions/{}",
                competition_id, user_id
            ),
            json!({ "values": values, "is_public": is_public }),
        )
        .await
    }

    pub async fn submit_results(
        &self,
        competition_id: Uuid,
        results: &[(Uuid, f64)],
    ) -> (StatusCode, Value) {
        let results: Vec<Value> = results
            .iter()
            .map(|(metric_id, value)| {
                json!({ "metric_id": metric_id, "actual_value": value, "source": "10-Q" })
            })
            .collect();
        self.post(
            &format!("/api/v1/admin/competitions/{}/results", competition_id),
            json!({ "results": results }),
        )
        .await
    }

    pub async fn score(&self, competition_id: Uuid) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/api/v1/admin/competitions/{}/score", competition_id),
            None,
        )
        .await
    }
}

pub fn rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).expect("valid timestamp")
}

pub fn parse_id(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(|| panic!("expected uuid, got {}", value))
}

pub fn assert_close(actual: &Value, expected: f64) {
    let actual = actual
        .as_f64()
        .unwrap_or_else(|| panic!("expected number, got {}", actual));
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {} got {}",
        expected,
        actual
    );
}

pub fn revenue_and_eps() -> Value {
    json!([
        { "name": "Revenue", "code": "REVENUE", "unit": "USD", "weight": 0.5 },
        { "name": "EPS", "code": "EPS", "unit": "USD/share", "weight": 0.5 },
    ])
}
