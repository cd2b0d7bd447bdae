mod coordinator;
mod store;

pub use coordinator::*;
use earnings_core::{
    CompetitionStatus, MetricCode, MetricDefinition, MetricResultSubmission,
    PredictionValueSubmission,
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
pub use store::*;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::infra::db::{
    parse_enum, parse_optional_datetime, parse_optional_u32, parse_required_datetime, parse_u32,
    parse_uuid,
};

/// Admin request to open a new earnings competition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCompetition {
    pub ticker: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quarter: u8,
    pub fiscal_year: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub earnings_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub submission_open: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub submission_close: OffsetDateTime,
    pub metrics: Vec<MetricDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: Uuid,
    pub ticker: String,
    pub title: String,
    pub description: Option<String>,
    pub quarter: u8,
    pub fiscal_year: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub earnings_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub submission_open: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub submission_close: OffsetDateTime,
    pub status: CompetitionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Competition {
    pub fn accepts_predictions_at(&self, now: OffsetDateTime) -> bool {
        self.status == CompetitionStatus::Open && now <= self.submission_close
    }
}

impl FromRow<'_, SqliteRow> for Competition {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let quarter = parse_u32(row, "quarter")?;
        Ok(Competition {
            id: parse_uuid(row, "id")?,
            ticker: row.try_get("ticker")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            quarter: u8::try_from(quarter).map_err(|e| sqlx::Error::ColumnDecode {
                index: String::from("quarter"),
                source: Box::new(e),
            })?,
            fiscal_year: row.try_get("fiscal_year")?,
            earnings_date: parse_required_datetime(row, "earnings_date")?,
            submission_open: parse_required_datetime(row, "submission_open")?,
            submission_close: parse_required_datetime(row, "submission_close")?,
            status: parse_enum(row, "status")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub name: String,
    pub code: MetricCode,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub weight: f64,
    pub order: u32,
}

impl FromRow<'_, SqliteRow> for Metric {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Metric {
            id: parse_uuid(row, "id")?,
            competition_id: parse_uuid(row, "competition_id")?,
            name: row.try_get("name")?,
            code: parse_enum(row, "code")?,
            description: row.try_get("description")?,
            unit: row.try_get("unit")?,
            weight: row.try_get("weight")?,
            order: parse_u32(row, "display_order")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_id: Uuid,
    pub actual_value: f64,
    pub source: Option<String>,
}

impl FromRow<'_, SqliteRow> for MetricResult {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(MetricResult {
            metric_id: parse_uuid(row, "metric_id")?,
            actual_value: row.try_get("actual_value")?,
            source: row.try_get("source")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionResult {
    pub competition_id: Uuid,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub entered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scored_at: Option<OffsetDateTime>,
    pub values: Vec<MetricResult>,
}

/// Competition with everything a participant needs to see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionDetail {
    #[serde(flatten)]
    pub competition: Competition,
    pub metrics: Vec<Metric>,
    pub results: Option<CompetitionResult>,
    pub total_predictions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionValue {
    pub metric_id: Uuid,
    pub value: f64,
    /// Percentage error, set by the scoring pass
    pub error: Option<f64>,
}

impl FromRow<'_, SqliteRow> for PredictionValue {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(PredictionValue {
            metric_id: parse_uuid(row, "metric_id")?,
            value: row.try_get("value")?,
            error: row.try_get("error")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub user_id: Uuid,
    pub is_public: bool,
    pub total_score: Option<f64>,
    pub rank: Option<u32>,
    pub values: Vec<PredictionValue>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Prediction {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Prediction {
            id: parse_uuid(row, "id")?,
            competition_id: parse_uuid(row, "competition_id")?,
            user_id: parse_uuid(row, "user_id")?,
            is_public: row.try_get("is_public")?,
            total_score: row.try_get("total_score")?,
            rank: parse_optional_u32(row, "rank")?,
            // filled in by the store from prediction_values
            values: vec![],
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertPrediction {
    pub values: Vec<PredictionValueSubmission>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResults {
    pub results: Vec<MetricResultSubmission>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub status: CompetitionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub prediction_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub name: Option<String>,
    pub total_score: f64,
    pub is_public: bool,
    /// Only shared when the participant made the prediction public
    pub values: Option<Vec<PredictionValue>>,
}

impl FromRow<'_, SqliteRow> for LeaderboardEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LeaderboardEntry {
            rank: parse_u32(row, "rank")?,
            prediction_id: parse_uuid(row, "prediction_id")?,
            user_id: parse_uuid(row, "user_id")?,
            username: row.try_get("username")?,
            name: row.try_get("name")?,
            total_score: row.try_get("total_score")?,
            is_public: row.try_get("is_public")?,
            values: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionLeaderboard {
    pub competition_id: Uuid,
    pub status: CompetitionStatus,
    pub is_scored: bool,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRank {
    pub competition_id: Uuid,
    pub user_id: Uuid,
    pub rank: u32,
    pub total_score: f64,
    pub total_participants: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: u32,
    pub total_competitions: u32,
    pub active_competitions: u32,
    pub total_predictions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub competition_id: Uuid,
    pub scored: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub scored_at: OffsetDateTime,
}

/// Row of `competition_results` before its metric values are attached
pub(crate) struct CompetitionResultRow {
    pub competition_id: Uuid,
    pub notes: Option<String>,
    pub entered_at: OffsetDateTime,
    pub scored_at: Option<OffsetDateTime>,
}

impl FromRow<'_, SqliteRow> for CompetitionResultRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(CompetitionResultRow {
            competition_id: parse_uuid(row, "competition_id")?,
            notes: row.try_get("notes")?,
            entered_at: parse_required_datetime(row, "entered_at")?,
            scored_at: parse_optional_datetime(row, "scored_at")?,
        })
    }
}
