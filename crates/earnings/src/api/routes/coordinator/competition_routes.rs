use axum::{
    extract::{Path, Query, State},
    response::ErrorResponse,
    Json,
};
use earnings_core::CompetitionStatus;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        Competition, CompetitionDetail, CompetitionLeaderboard, Prediction, UpsertPrediction,
        UserRank,
    },
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CompetitionFilter {
    pub status: Option<CompetitionStatus>,
}

pub async fn get_competitions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CompetitionFilter>,
) -> Result<Json<Vec<Competition>>, ErrorResponse> {
    state
        .coordinator
        .list_competitions(filter.status)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting competitions: {:?}", e);
            e.into()
        })
}

pub async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
) -> Result<Json<CompetitionDetail>, ErrorResponse> {
    state
        .coordinator
        .get_competition(competition_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting competition {}: {:?}", competition_id, e);
            e.into()
        })
}

pub async fn upsert_prediction(
    State(state): State<Arc<AppState>>,
    Path((competition_id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpsertPrediction>,
) -> Result<Json<Prediction>, ErrorResponse> {
    state
        .coordinator
        .upsert_prediction(competition_id, user_id, body)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error saving prediction for user {} in competition {}: {:?}",
                user_id, competition_id, e
            );
            e.into()
        })
}

pub async fn get_prediction(
    State(state): State<Arc<AppState>>,
    Path((competition_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Prediction>, ErrorResponse> {
    state
        .coordinator
        .get_prediction(competition_id, user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error getting prediction for user {} in competition {}: {:?}",
                user_id, competition_id, e
            );
            e.into()
        })
}

pub async fn get_competition_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
) -> Result<Json<CompetitionLeaderboard>, ErrorResponse> {
    state
        .coordinator
        .competition_leaderboard(competition_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error getting leaderboard for competition {}: {:?}",
                competition_id, e
            );
            e.into()
        })
}

pub async fn get_user_rank(
    State(state): State<Arc<AppState>>,
    Path((competition_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<UserRank>, ErrorResponse> {
    state
        .coordinator
        .user_rank(competition_id, user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error getting rank for user {} in competition {}: {:?}",
                user_id, competition_id, e
            );
            e.into()
        })
}
