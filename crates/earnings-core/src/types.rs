//! Shared types between the scoring engine and the competition service

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use uuid::Uuid;

use crate::CoreError;

/// Financial quantity a competition asks participants to forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricCode {
    Revenue,
    Eps,
    NetIncome,
    ForwardRevenueGuidance,
    ForwardEpsGuidance,
    GrossMargin,
    OperatingIncome,
    Custom,
}

impl MetricCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCode::Revenue => "REVENUE",
            MetricCode::Eps => "EPS",
            MetricCode::NetIncome => "NET_INCOME",
            MetricCode::ForwardRevenueGuidance => "FORWARD_REVENUE_GUIDANCE",
            MetricCode::ForwardEpsGuidance => "FORWARD_EPS_GUIDANCE",
            MetricCode::GrossMargin => "GROSS_MARGIN",
            MetricCode::OperatingIncome => "OPERATING_INCOME",
            MetricCode::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for MetricCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REVENUE" => Ok(MetricCode::Revenue),
            "EPS" => Ok(MetricCode::Eps),
            "NET_INCOME" => Ok(MetricCode::NetIncome),
            "FORWARD_REVENUE_GUIDANCE" => Ok(MetricCode::ForwardRevenueGuidance),
            "FORWARD_EPS_GUIDANCE" => Ok(MetricCode::ForwardEpsGuidance),
            "GROSS_MARGIN" => Ok(MetricCode::GrossMargin),
            "OPERATING_INCOME" => Ok(MetricCode::OperatingIncome),
            "CUSTOM" => Ok(MetricCode::Custom),
            other => Err(CoreError::UnknownMetricCode(other.to_string())),
        }
    }
}

/// Where a competition is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionStatus {
    Upcoming,
    Open,
    Closed,
    Scoring,
    Completed,
    Cancelled,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Upcoming => "UPCOMING",
            CompetitionStatus::Open => "OPEN",
            CompetitionStatus::Closed => "CLOSED",
            CompetitionStatus::Scoring => "SCORING",
            CompetitionStatus::Completed => "COMPLETED",
            CompetitionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether an admin may move a competition from `self` to `next` by hand.
    /// SCORING and COMPLETED are only reached by submitting results and
    /// running the scoring pass.
    pub fn can_transition_to(&self, next: CompetitionStatus) -> bool {
        use CompetitionStatus::*;
        matches!(
            (self, next),
            (Upcoming, Open)
                | (Upcoming, Cancelled)
                | (Open, Closed)
                | (Open, Cancelled)
                | (Closed, Cancelled)
        )
    }

    /// Results can only be entered once submissions are closed
    pub fn accepts_results(&self) -> bool {
        matches!(self, CompetitionStatus::Closed | CompetitionStatus::Scoring)
    }

    /// Ranks exist only once the scoring pass has committed
    pub fn is_scored(&self) -> bool {
        matches!(self, CompetitionStatus::Completed)
    }
}

impl fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetitionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPCOMING" => Ok(CompetitionStatus::Upcoming),
            "OPEN" => Ok(CompetitionStatus::Open),
            "CLOSED" => Ok(CompetitionStatus::Closed),
            "SCORING" => Ok(CompetitionStatus::Scoring),
            "COMPLETED" => Ok(CompetitionStatus::Completed),
            "CANCELLED" => Ok(CompetitionStatus::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Metric as requested when a competition is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub code: MetricCode,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Falls back to the code's default weight when omitted
    #[serde(default)]
    pub weight: Option<f64>,
    /// Display position, defaults to the position in the request
    #[serde(default)]
    pub order: Option<u32>,
}

/// A user's forecast for one metric as submitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictionValueSubmission {
    pub metric_id: Uuid,
    pub value: f64,
}

/// An admin-entered reported value for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResultSubmission {
    pub metric_id: Uuid,
    pub actual_value: f64,
    #[serde(default)]
    pub source: Option<String>,
}

/// The parts of a metric the engine needs to score a value against it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRef {
    pub code: MetricCode,
    pub weight: f64,
}

/// A single forecast inside a prediction, resolved with its metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionValueInput {
    pub metric_id: Uuid,
    pub value: f64,
    pub metric: MetricRef,
}

/// One user's full set of forecasts for a competition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub id: Uuid,
    pub user_id: Uuid,
    pub values: Vec<PredictionValueInput>,
}

/// The reported value of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActualResult {
    pub actual_value: f64,
}

/// Lookup from metric id to its reported value
pub type ActualResults = HashMap<Uuid, ActualResult>;

/// Score breakdown for a single metric of a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub metric_id: Uuid,
    pub metric_code: MetricCode,
    pub predicted_value: f64,
    pub actual_value: f64,
    pub weight: f64,
    pub percentage_error: f64,
    pub weighted_error: f64,
}

/// Scored and ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionScore {
    pub prediction_id: Uuid,
    pub user_id: Uuid,
    pub metric_scores: Vec<MetricScore>,
    /// Weighted average percentage error, lower is better
    pub total_weighted_error: f64,
    pub rank: u32,
}
