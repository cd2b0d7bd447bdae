use earnings_core::{
    missing_results, resolve_weight, score_competition, validate_metric_definitions,
    validate_metric_results, validate_prediction_values, CompetitionStatus,
};
use log::{debug, error, info, warn};
use std::{collections::HashSet, sync::Arc};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    AdminStats, Competition, CompetitionDetail, CompetitionLeaderboard, CompetitionStore,
    CreateCompetition, Metric, Prediction, ScoringOutcome, ScoringSummary, SubmitResults,
    UpsertPrediction, UserRank,
};
use crate::domain::{Error, UserStore};

pub const MIN_FISCAL_YEAR: i32 = 2020;
pub const MAX_FISCAL_YEAR: i32 = 2100;

pub struct Coordinator {
    pub competition_store: Arc<CompetitionStore>,
    user_store: Arc<UserStore>,
}

impl Coordinator {
    pub fn new(competition_store: CompetitionStore, user_store: UserStore) -> Self {
        Self {
            competition_store: Arc::new(competition_store),
            user_store: Arc::new(user_store),
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.competition_store.ping().await.map_err(|e| {
            error!("failed to ping competition store: {}", e);
            Error::DbError(e)
        })
    }

    pub async fn create_competition(
        &self,
        create_competition: CreateCompetition,
    ) -> Result<Competition, Error> {
        let ticker = create_competition.ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(Error::BadRequest(String::from("ticker cannot be empty")));
        }
        if create_competition.title.trim().is_empty() {
            return Err(Error::BadRequest(String::from("title cannot be empty")));
        }
        if !(1..=4).contains(&create_competition.quarter) {
            return Err(Error::BadRequest(format!(
                "quarter must be between 1 and 4, got {}",
                create_competition.quarter
            )));
        }
        if !(MIN_FISCAL_YEAR..=MAX_FISCAL_YEAR).contains(&create_competition.fiscal_year) {
            return Err(Error::BadRequest(format!(
                "fiscal year must be between {} and {}, got {}",
                MIN_FISCAL_YEAR, MAX_FISCAL_YEAR, create_competition.fiscal_year
            )));
        }
        if create_competition.submission_open >= create_competition.submission_close {
            return Err(Error::BadRequest(String::from(
                "submission_open must be before submission_close",
            )));
        }
        validate_metric_definitions(&create_competition.metrics)?;

        if self
            .competition_store
            .competition_exists_for_period(
                &ticker,
                create_competition.quarter,
                create_competition.fiscal_year,
            )
            .await?
        {
            return Err(Error::Conflict(format!(
                "competition for {} Q{} {} already exists",
                ticker, create_competition.quarter, create_competition.fiscal_year
            )));
        }

        let now = OffsetDateTime::now_utc();
        let competition = Competition {
            id: Uuid::now_v7(),
            ticker,
            title: create_competition.title.trim().to_string(),
            description: create_competition.description,
            quarter: create_competition.quarter,
            fiscal_year: create_competition.fiscal_year,
            earnings_date: create_competition.earnings_date,
            submission_open: create_competition.submission_open,
            submission_close: create_competition.submission_close,
            status: CompetitionStatus::Upcoming,
            created_at: now,
            updated_at: now,
        };

        let metrics: Vec<Metric> = create_competition
            .metrics
            .into_iter()
            .zip(0_u32..)
            .map(|(definition, position)| Metric {
                id: Uuid::now_v7(),
                competition_id: competition.id,
                name: definition.name.trim().to_string(),
                code: definition.code,
                description: definition.description,
                unit: definition.unit,
                weight: resolve_weight(definition.code, definition.weight),
                order: definition.order.unwrap_or(position),
            })
            .collect();
        debug!("resolved metrics: {:?}", metrics);

        let competition = self
            .competition_store
            .add_competition(competition, metrics)
            .await?;
        info!(
            "created competition {} for {} Q{} {}",
            competition.id, competition.ticker, competition.quarter, competition.fiscal_year
        );
        Ok(competition)
    }

    pub async fn list_competitions(
        &self,
        status: Option<CompetitionStatus>,
    ) -> Result<Vec<Competition>, Error> {
        Ok(self.competition_store.list_competitions(status).await?)
    }

    async fn find_competition(&self, competition_id: Uuid) -> Result<Competition, Error> {
        self.competition_store
            .get_competition(competition_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("competition not found with id: {}", competition_id))
            })
    }

    pub async fn get_competition(&self, competition_id: Uuid) -> Result<CompetitionDetail, Error> {
        let competition = self.find_competition(competition_id).await?;
        let metrics = self.competition_store.get_metrics(competition_id).await?;
        let results = self.competition_store.get_results(competition_id).await?;
        let total_predictions = self
            .competition_store
            .count_predictions(competition_id)
            .await?;

        Ok(CompetitionDetail {
            competition,
            metrics,
            results,
            total_predictions,
        })
    }

    pub async fn update_competition_status(
        &self,
        competition_id: Uuid,
        next: CompetitionStatus,
    ) -> Result<Competition, Error> {
        let competition = self.find_competition(competition_id).await?;
        if !competition.status.can_transition_to(next) {
            return Err(Error::BadRequest(format!(
                "competition cannot move from {} to {}",
                competition.status, next
            )));
        }

        let updated = self
            .competition_store
            .update_status(competition_id, competition.status, next)
            .await?;
        if !updated {
            return Err(Error::Conflict(format!(
                "competition {} changed status concurrently, retry",
                competition_id
            )));
        }
        info!(
            "competition {} moved from {} to {}",
            competition_id, competition.status, next
        );

        self.find_competition(competition_id).await
    }

    pub async fn upsert_prediction(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
        payload: UpsertPrediction,
    ) -> Result<Prediction, Error> {
        let competition = self.find_competition(competition_id).await?;
        // ensures the user exists before anything is written
        self.user_store.get_user(user_id).await?;

        let now = OffsetDateTime::now_utc();
        if competition.status != CompetitionStatus::Open {
            return Err(Error::BadRequest(format!(
                "competition is {}, predictions are only accepted while OPEN",
                competition.status
            )));
        }
        if !competition.accepts_predictions_at(now) {
            return Err(Error::BadRequest(String::from(
                "submission window for this competition has closed",
            )));
        }

        let metric_ids: HashSet<Uuid> = self
            .competition_store
            .get_metrics(competition_id)
            .await?
            .into_iter()
            .map(|metric| metric.id)
            .collect();
        validate_prediction_values(&payload.values, &metric_ids)?;

        let stored = self
            .competition_store
            .upsert_prediction(competition_id, user_id, payload.values, payload.is_public)
            .await?;
        if stored.is_none() {
            return Err(Error::BadRequest(String::from(
                "competition stopped accepting predictions",
            )));
        }
        debug!(
            "stored prediction for user {} in competition {}",
            user_id, competition_id
        );

        self.get_prediction(competition_id, user_id).await
    }

    pub async fn get_prediction(
        &self,
        competition_id: Uuid,
        user_id: Uuid,
    ) -> Result<Prediction, Error> {
        self.competition_store
            .get_prediction(competition_id, user_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no prediction from user {} in competition {}",
                    user_id, competition_id
                ))
            })
    }

    pub async fn submit_results(
        &self,
        competition_id: Uuid,
        payload: SubmitResults,
    ) -> Result<CompetitionDetail, Error> {
        let competition = self.find_competition(competition_id).await?;
        if !competition.status.accepts_results() {
            return Err(Error::BadRequest(format!(
                "results cannot be entered while competition is {}",
                competition.status
            )));
        }

        let metric_ids: HashSet<Uuid> = self
            .competition_store
            .get_metrics(competition_id)
            .await?
            .into_iter()
            .map(|metric| metric.id)
            .collect();
        validate_metric_results(&payload.results, &metric_ids)?;

        let notes = payload
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());
        let accepted = self
            .competition_store
            .upsert_results(competition_id, payload.results, notes)
            .await?;
        if !accepted {
            return Err(Error::BadRequest(String::from(
                "competition stopped accepting results",
            )));
        }
        info!("results recorded for competition {}", competition_id);

        self.get_competition(competition_id).await
    }

    /// Score every prediction of a competition and fold the scores into the
    /// participants' running stats. Runs at most once per competition.
    pub async fn trigger_scoring(&self, competition_id: Uuid) -> Result<ScoringSummary, Error> {
        let competition = self.find_competition(competition_id).await?;
        let Some(results) = self.competition_store.get_results(competition_id).await? else {
            return Err(Error::BadRequest(String::from(
                "results must be submitted before scoring",
            )));
        };
        if results.scored_at.is_some() || competition.status == CompetitionStatus::Completed {
            return Err(Error::AlreadyScored(competition_id));
        }

        let metric_ids: Vec<Uuid> = self
            .competition_store
            .get_metrics(competition_id)
            .await?
            .into_iter()
            .map(|metric| metric.id)
            .collect();
        let actual_results = self.competition_store.actual_results(competition_id).await?;
        let missing = missing_results(&metric_ids, &actual_results);
        if !missing.is_empty() {
            warn!(
                "competition {} missing results for {} metrics",
                competition_id,
                missing.len()
            );
            return Err(Error::ResultsIncomplete { missing });
        }

        let predictions = self
            .competition_store
            .predictions_for_scoring(competition_id)
            .await?;
        let scores = score_competition(&predictions, &actual_results);
        for score in &scores {
            debug!(
                "prediction {} user {} error {} rank {}",
                score.prediction_id, score.user_id, score.total_weighted_error, score.rank
            );
        }
        let scored = scores.len();

        match self
            .competition_store
            .record_scores(competition_id, results.entered_at, scores)
            .await?
        {
            ScoringOutcome::Scored(scored_at) => {
                info!(
                    "scored {} predictions for competition {}",
                    scored, competition_id
                );
                Ok(ScoringSummary {
                    competition_id,
                    scored,
                    scored_at,
                })
            }
            ScoringOutcome::AlreadyScored => {
                warn!(
                    "competition {} was scored by a concurrent request",
                    competition_id
                );
                Err(Error::AlreadyScored(competition_id))
            }
            ScoringOutcome::ResultsChanged => {
                warn!(
                    "results for competition {} changed while scoring",
                    competition_id
                );
                Err(Error::Conflict(format!(
                    "results for competition {} changed while scoring, retry",
                    competition_id
                )))
            }
        }
    }

    pub async fn competition_leaderboard(
        &self,
        competition_id: Uuid,
    ) -> Result<CompetitionLeaderboard, Error> {
        let competition = self.find_competition(competition_id).await?;
        let is_scored = competition.status.is_scored();
        let entries = if is_scored {
            self.competition_store.leaderboard(competition_id).await?
        } else {
            vec![]
        };

        Ok(CompetitionLeaderboard {
            competition_id,
            status: competition.status,
            is_scored,
            entries,
        })
    }

    pub async fn user_rank(&self, competition_id: Uuid, user_id: Uuid) -> Result<UserRank, Error> {
        self.find_competition(competition_id).await?;
        self.competition_store
            .user_rank(competition_id, user_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no scored prediction from user {} in competition {}",
                    user_id, competition_id
                ))
            })
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, Error> {
        Ok(self.competition_store.admin_stats().await?)
    }
}
