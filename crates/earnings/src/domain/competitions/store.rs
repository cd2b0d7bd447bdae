use earnings_core::{
    fold_scores, ActualResult, ActualResults, CompetitionStatus, MetricCode, MetricRef,
    MetricResultSubmission, PredictionInput, PredictionScore, PredictionValueInput,
    PredictionValueSubmission,
};
use itertools::Itertools;
use log::{debug, info};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::{conflict_on_unique, stats_from_row, Error},
    infra::db::{format_datetime, parse_enum, parse_u32, parse_uuid, DBConnection},
};

use super::{
    AdminStats, Competition, CompetitionResult, CompetitionResultRow, LeaderboardEntry, Metric,
    MetricResult, Prediction, PredictionValue, UserRank,
};

const COMPETITION_COLUMNS: &str = "id, ticker, title, description, quarter, fiscal_year, earnings_date, submission_open, submission_close, status, created_at, updated_at";

/// Outcome of trying to claim a competition's one-shot scoring pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringOutcome {
    Scored(OffsetDateTime),
    AlreadyScored,
    /// Results were re-entered after the scores were computed
    ResultsChanged,
}

/// One prediction value joined with its metric, in scoring order
struct ScoringRow {
    prediction_id: Uuid,
    user_id: Uuid,
    metric_id: Uuid,
    value: f64,
    code: MetricCode,
    weight: f64,
}

impl FromRow<'_, SqliteRow> for ScoringRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ScoringRow {
            prediction_id: parse_uuid(row, "prediction_id")?,
            user_id: parse_uuid(row, "user_id")?,
            metric_id: parse_uuid(row, "metric_id")?,
            value: row.try_get("value")?,
            code: parse_enum(row, "code")?,
            weight: row.try_get("weight")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompetitionStore {
    db_connection: DBConnection,
}

impl CompetitionStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn add_competition(
        &self,
        competition: Competition,
        metrics: Vec<Metric>,
    ) -> Result<Competition, Error> {
        let id = competition.id.to_string();
        let earnings_date = format_datetime(competition.earnings_date)?;
        let submission_open = format_datetime(competition.submission_open)?;
        let submission_close = format_datetime(competition.submission_close)?;
        let created_at = format_datetime(competition.created_at)?;
        let updated_at = format_datetime(competition.updated_at)?;
        let conflict_message = format!(
            "competition for {} Q{} {} already exists",
            competition.ticker, competition.quarter, competition.fiscal_year
        );
        let row = competition.clone();

        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                sqlx::query(
                    "INSERT INTO competitions (
                        id,
                        ticker,
                        title,
                        description,
                        quarter,
                        fiscal_year,
                        earnings_date,
                        submission_open,
                        submission_close,
                        status,
                        created_at,
                        updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&row.ticker)
                .bind(&row.title)
                .bind(&row.description)
                .bind(i64::from(row.quarter))
                .bind(row.fiscal_year)
                .bind(&earnings_date)
                .bind(&submission_open)
                .bind(&submission_close)
                .bind(row.status.as_str())
                .bind(&created_at)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await?;

                for metric in &metrics {
                    sqlx::query(
                        "INSERT INTO metrics (
                            id,
                            competition_id,
                            name,
                            code,
                            description,
                            unit,
                            weight,
                            display_order
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(metric.id.to_string())
                    .bind(&id)
                    .bind(&metric.name)
                    .bind(metric.code.as_str())
                    .bind(&metric.description)
                    .bind(&metric.unit)
                    .bind(metric.weight)
                    .bind(i64::from(metric.order))
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok(())
            })
            .await
            .map_err(|e| conflict_on_unique(e, conflict_message))?;

        Ok(competition)
    }

    pub async fn competition_exists_for_period(
        &self,
        ticker: &str,
        quarter: u8,
        fiscal_year: i32,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM competitions WHERE ticker = ? AND quarter = ? AND fiscal_year = ?",
        )
        .bind(ticker)
        .bind(i64::from(quarter))
        .bind(fiscal_year)
        .fetch_one(self.db_connection.read())
        .await?;
        Ok(count > 0)
    }

    pub async fn list_competitions(
        &self,
        status: Option<CompetitionStatus>,
    ) -> Result<Vec<Competition>, sqlx::Error> {
        let competitions = match status {
            Some(status) => {
                sqlx::query_as::<_, Competition>(&format!(
                    "SELECT {} FROM competitions WHERE status = ? ORDER BY earnings_date ASC, id ASC",
                    COMPETITION_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(self.db_connection.read())
                .await?
            }
            None => {
                sqlx::query_as::<_, Competition>(&format!(
                    "SELECT {} FROM competitions ORDER BY earnings_date ASC, id ASC",
                    COMPETITION_COLUMNS
                ))
                .fetch_all(self.db_connection.read())
                .await?
            }
        };
        Ok(competitions)
    }

    pub async fn get_competition(
        &self,
        competition_id: Uuid,
    ) -> Result<Option<Competition>, sqlx::Error> {
        sqlx::query_as::<_, Competition>(&format!(
            "SELECT {} FROM competitions WHERE id = ?",
            COMPETITION_COLUMNS
        ))
        .bind(competition_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    pub async fn get_metrics(&self, competition_id: Uuid) -> Result<Vec<Metric>, sqlx::Error> {
        sqlx::query_as::<_, Metric>(
            "SELECT id, competition_id, name, code, description, unit, weight, display_order
            FROM metrics
            WHERE competition_id = ?
            ORDER BY display_order ASC, id ASC",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await
    }

    pub async fn get_results(
        &self,
        competition_id: Uuid,
    ) -> Result<Option<CompetitionResult>, sqlx::Error> {
        let Some(result) = sqlx::query_as::<_, CompetitionResultRow>(
            "SELECT competition_id, notes, entered_at, scored_at
            FROM competition_results
            WHERE competition_id = ?",
        )
        .bind(competition_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?
        else {
            return Ok(None);
        };

        let values = sqlx::query_as::<_, MetricResult>(
            "SELECT metric_results.metric_id, metric_results.actual_value, metric_results.source
            FROM metric_results
            JOIN metrics ON metrics.id = metric_results.metric_id
            WHERE metric_results.competition_id = ?
            ORDER BY metrics.display_order ASC",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(Some(CompetitionResult {
            competition_id: result.competition_id,
            notes: result.notes,
            entered_at: result.entered_at,
            scored_at: result.scored_at,
            values,
        }))
    }

    pub async fn actual_results(&self, competition_id: Uuid) -> Result<ActualResults, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT metric_id, actual_value FROM metric_results WHERE competition_id = ?",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        rows.iter()
            .map(|row| -> Result<(Uuid, ActualResult), sqlx::Error> {
                Ok((
                    parse_uuid(row, "metric_id")?,
                    ActualResult {
                        actual_value: row.try_get("actual_value")?,
                    },
                ))
            })
            .collect()
    }

    pub async fn count_predictions(&self, competition_id: Uuid) -> Result<u32, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM predictions WHERE competition_id = ?")
            .bind(competition_id.to_string())
            .fetch_one(self.db_connection.read())
            .await?;
        parse_u32(&row, "total")
    }

    /// Move a competition from `current` to `next`, returns false if the
    /// status changed underneath us
    pub async fn update_status(
        &self,
        competition_id: Uuid,
        current: CompetitionStatus,
        next: CompetitionStatus,
    ) -> Result<bool, Error> {
        let now = format_datetime(OffsetDateTime::now_utc())?;
        let rows_affected = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE competitions
                     SET status = ?,
                         updated_at = ?
                     WHERE id = ? AND status = ?",
                )
                .bind(next.as_str())
                .bind(now)
                .bind(competition_id.to_string())
                .bind(current.as_str())
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;

        Ok(rows_affected == 1)
    }

    /// Insert or replace a user's prediction. Returns `None` when the
    /// competition stopped accepting predictions before the write landed.
    pub async fn upsert_prediction(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
        values: Vec<PredictionValueSubmission>,
        is_public: bool,
    ) -> Result<Option<Uuid>, Error> {
        let new_id = Uuid::now_v7().to_string();
        let now = format_datetime(OffsetDateTime::now_utc())?;
        let competition_id = competition_id.to_string();
        let user_id = user_id.to_string();

        let prediction_id = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM competitions WHERE id = ?")
                        .bind(&competition_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if status.as_deref() != Some(CompetitionStatus::Open.as_str()) {
                    return Ok(None);
                }

                let prediction_id: String = sqlx::query_scalar(
                    "INSERT INTO predictions (
                        id,
                        competition_id,
                        user_id,
                        is_public,
                        created_at,
                        updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT (user_id, competition_id) DO UPDATE
                    SET is_public = excluded.is_public,
                        updated_at = excluded.updated_at
                    RETURNING id",
                )
                .bind(&new_id)
                .bind(&competition_id)
                .bind(&user_id)
                .bind(is_public)
                .bind(&now)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM prediction_values WHERE prediction_id = ?")
                    .bind(&prediction_id)
                    .execute(&mut *tx)
                    .await?;

                for value in &values {
                    sqlx::query(
                        "INSERT INTO prediction_values (prediction_id, metric_id, value)
                        VALUES (?, ?, ?)",
                    )
                    .bind(&prediction_id)
                    .bind(value.metric_id.to_string())
                    .bind(value.value)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok(Some(prediction_id))
            })
            .await?;

        prediction_id
            .map(|id| Uuid::parse_str(&id).map_err(|e| Error::BadRequest(e.to_string())))
            .transpose()
    }

    pub async fn get_prediction(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Prediction>, sqlx::Error> {
        let Some(mut prediction) = sqlx::query_as::<_, Prediction>(
            "SELECT id, competition_id, user_id, is_public, total_score, rank, created_at, updated_at
            FROM predictions
            WHERE competition_id = ? AND user_id = ?",
        )
        .bind(competition_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?
        else {
            return Ok(None);
        };

        prediction.values = sqlx::query_as::<_, PredictionValue>(
            "SELECT prediction_values.metric_id, prediction_values.value, prediction_values.error
            FROM prediction_values
            JOIN metrics ON metrics.id = prediction_values.metric_id
            WHERE prediction_values.prediction_id = ?
            ORDER BY metrics.display_order ASC",
        )
        .bind(prediction.id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(Some(prediction))
    }

    /// Record results for a competition that is closed or awaiting scoring and
    /// move it to SCORING. Returns false when the competition is in any other state.
    pub async fn upsert_results(
        &self,
        competition_id: Uuid,
        results: Vec<MetricResultSubmission>,
        notes: Option<String>,
    ) -> Result<bool, Error> {
        let now = format_datetime(OffsetDateTime::now_utc())?;
        let competition_id = competition_id.to_string();

        let accepted = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let moved = sqlx::query(
                    "UPDATE competitions
                     SET status = ?,
                         updated_at = ?
                     WHERE id = ? AND status IN (?, ?)",
                )
                .bind(CompetitionStatus::Scoring.as_str())
                .bind(&now)
                .bind(&competition_id)
                .bind(CompetitionStatus::Closed.as_str())
                .bind(CompetitionStatus::Scoring.as_str())
                .execute(&mut *tx)
                .await?;
                if moved.rows_affected() == 0 {
                    return Ok(false);
                }

                sqlx::query(
                    "INSERT INTO competition_results (competition_id, notes, entered_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT (competition_id) DO UPDATE
                    SET notes = COALESCE(excluded.notes, competition_results.notes),
                        entered_at = excluded.entered_at",
                )
                .bind(&competition_id)
                .bind(&notes)
                .bind(&now)
                .execute(&mut *tx)
                .await?;

                for result in &results {
                    sqlx::query(
                        "INSERT INTO metric_results (metric_id, competition_id, actual_value, source)
                        VALUES (?, ?, ?, ?)
                        ON CONFLICT (metric_id) DO UPDATE
                        SET actual_value = excluded.actual_value,
                            source = excluded.source",
                    )
                    .bind(result.metric_id.to_string())
                    .bind(&competition_id)
                    .bind(result.actual_value)
                    .bind(&result.source)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok(true)
            })
            .await?;

        Ok(accepted)
    }

    /// Every prediction of a competition with its values resolved against
    /// their metrics, in submission order
    pub async fn predictions_for_scoring(
        &self,
        competition_id: Uuid,
    ) -> Result<Vec<PredictionInput>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ScoringRow>(
            "SELECT
                predictions.id AS prediction_id,
                predictions.user_id AS user_id,
                prediction_values.metric_id AS metric_id,
                prediction_values.value AS value,
                metrics.code AS code,
                metrics.weight AS weight
            FROM predictions
            JOIN prediction_values ON prediction_values.prediction_id = predictions.id
            JOIN metrics ON metrics.id = prediction_values.metric_id
            WHERE predictions.competition_id = ?
            ORDER BY predictions.created_at ASC, predictions.id ASC, metrics.display_order ASC",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        let grouped = rows
            .into_iter()
            .chunk_by(|row| (row.prediction_id, row.user_id));

        let predictions = grouped
            .into_iter()
            .map(|((id, user_id), values)| PredictionInput {
                id,
                user_id,
                values: values
                    .map(|row| PredictionValueInput {
                        metric_id: row.metric_id,
                        value: row.value,
                        metric: MetricRef {
                            code: row.code,
                            weight: row.weight,
                        },
                    })
                    .collect(),
            })
            .collect();

        Ok(predictions)
    }

    /// Persist a full scoring pass in one transaction. The pass is claimed by
    /// setting `competition_results.scored_at`, so a competition can only ever
    /// contribute to user stats once. The claim only succeeds while the results
    /// are still the ones entered at `results_entered_at`.
    pub async fn record_scores(
        &self,
        competition_id: Uuid,
        results_entered_at: OffsetDateTime,
        scores: Vec<PredictionScore>,
    ) -> Result<ScoringOutcome, Error> {
        let scored_at = OffsetDateTime::now_utc();
        let now = format_datetime(scored_at)?;
        let entered_at = format_datetime(results_entered_at)?;
        let competition_id = competition_id.to_string();

        let outcome = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;

                let claimed = sqlx::query(
                    "UPDATE competition_results
                     SET scored_at = ?
                     WHERE competition_id = ? AND scored_at IS NULL AND entered_at = ?",
                )
                .bind(&now)
                .bind(&competition_id)
                .bind(&entered_at)
                .execute(&mut *tx)
                .await?;
                if claimed.rows_affected() == 0 {
                    let previously_scored = sqlx::query_scalar::<_, Option<String>>(
                        "SELECT scored_at FROM competition_results WHERE competition_id = ?",
                    )
                    .bind(&competition_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .flatten();
                    return Ok(if previously_scored.is_some() {
                        ScoringOutcome::AlreadyScored
                    } else {
                        ScoringOutcome::ResultsChanged
                    });
                }

                for score in &scores {
                    sqlx::query(
                        "UPDATE predictions
                         SET total_score = ?,
                             rank = ?,
                             updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(score.total_weighted_error)
                    .bind(i64::from(score.rank))
                    .bind(&now)
                    .bind(score.prediction_id.to_string())
                    .execute(&mut *tx)
                    .await?;

                    for metric_score in &score.metric_scores {
                        sqlx::query(
                            "UPDATE prediction_values
                             SET error = ?
                             WHERE prediction_id = ? AND metric_id = ?",
                        )
                        .bind(metric_score.percentage_error)
                        .bind(score.prediction_id.to_string())
                        .bind(metric_score.metric_id.to_string())
                        .execute(&mut *tx)
                        .await?;
                    }
                }

                let user_ids: Vec<Uuid> = scores
                    .iter()
                    .map(|score| score.user_id)
                    .unique()
                    .collect();
                let mut current = HashMap::new();
                for user_id in user_ids {
                    let row = sqlx::query(
                        "SELECT total_predictions, total_wins, average_score
                        FROM users
                        WHERE id = ?",
                    )
                    .bind(user_id.to_string())
                    .fetch_one(&mut *tx)
                    .await?;
                    current.insert(user_id, stats_from_row(&row)?);
                }

                let updated = fold_scores(current, &scores);
                for (user_id, stats) in &updated {
                    debug!("user {} stats now {:?}", user_id, stats);
                    sqlx::query(
                        "UPDATE users
                         SET total_predictions = ?,
                             total_wins = ?,
                             average_score = ?,
                             updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(i64::from(stats.total_predictions))
                    .bind(i64::from(stats.total_wins))
                    .bind(stats.average_score)
                    .bind(&now)
                    .bind(user_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                }

                sqlx::query(
                    "UPDATE competitions
                     SET status = ?,
                         updated_at = ?
                     WHERE id = ?",
                )
                .bind(CompetitionStatus::Completed.as_str())
                .bind(&now)
                .bind(&competition_id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                info!(
                    "recorded {} scores and updated {} users for competition {}",
                    scores.len(),
                    updated.len(),
                    competition_id
                );
                Ok(ScoringOutcome::Scored(scored_at))
            })
            .await?;

        Ok(outcome)
    }

    /// Scored predictions ordered by rank, then submission time
    pub async fn leaderboard(
        &self,
        competition_id: Uuid,
    ) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        let mut entries = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT
                predictions.rank AS rank,
                predictions.id AS prediction_id,
                predictions.user_id AS user_id,
                users.username AS username,
                users.name AS name,
                predictions.total_score AS total_score,
                predictions.is_public AS is_public
            FROM predictions
            JOIN users ON users.id = predictions.user_id
            WHERE predictions.competition_id = ? AND predictions.rank IS NOT NULL
            ORDER BY predictions.rank ASC, predictions.created_at ASC, predictions.id ASC",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        let rows = sqlx::query(
            "SELECT
                prediction_values.prediction_id AS prediction_id,
                prediction_values.metric_id AS metric_id,
                prediction_values.value AS value,
                prediction_values.error AS error
            FROM prediction_values
            JOIN predictions ON predictions.id = prediction_values.prediction_id
            JOIN metrics ON metrics.id = prediction_values.metric_id
            WHERE predictions.competition_id = ? AND predictions.is_public = 1
            ORDER BY metrics.display_order ASC",
        )
        .bind(competition_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        let mut public_values: HashMap<Uuid, Vec<PredictionValue>> = rows
            .iter()
            .map(|row| -> Result<(Uuid, PredictionValue), sqlx::Error> {
                Ok((parse_uuid(row, "prediction_id")?, PredictionValue::from_row(row)?))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .into_group_map();

        for entry in entries.iter_mut().filter(|entry| entry.is_public) {
            entry.values = public_values.remove(&entry.prediction_id);
        }

        Ok(entries)
    }

    pub async fn user_rank(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserRank>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT
                predictions.rank AS rank,
                predictions.total_score AS total_score,
                (SELECT COUNT(*) FROM predictions AS scored
                    WHERE scored.competition_id = predictions.competition_id
                    AND scored.rank IS NOT NULL) AS total_participants
            FROM predictions
            WHERE predictions.competition_id = ?
                AND predictions.user_id = ?
                AND predictions.rank IS NOT NULL",
        )
        .bind(competition_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        row.map(|row| -> Result<UserRank, sqlx::Error> {
            Ok(UserRank {
                competition_id,
                user_id,
                rank: parse_u32(&row, "rank")?,
                total_score: row.try_get("total_score")?,
                total_participants: parse_u32(&row, "total_participants")?,
            })
        })
        .transpose()
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, sqlx::Error> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM competitions) AS total_competitions,
                (SELECT COUNT(*) FROM competitions WHERE status IN (?, ?)) AS active_competitions,
                (SELECT COUNT(*) FROM predictions) AS total_predictions",
        )
        .bind(CompetitionStatus::Upcoming.as_str())
        .bind(CompetitionStatus::Open.as_str())
        .fetch_one(self.db_connection.read())
        .await?;

        Ok(AdminStats {
            total_users: parse_u32(&row, "total_users")?,
            total_competitions: parse_u32(&row, "total_competitions")?,
            active_competitions: parse_u32(&row, "active_competitions")?,
            total_predictions: parse_u32(&row, "total_predictions")?,
        })
    }
}
