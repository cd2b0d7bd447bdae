use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::error;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        AdminStats, Competition, CompetitionDetail, CreateCompetition, ScoringSummary,
        SubmitResults, UpdateStatus,
    },
    startup::AppState,
};

// Private routes, only reachable from the operator's network
pub async fn create_competition(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCompetition>,
) -> Result<(StatusCode, Json<Competition>), ErrorResponse> {
    state
        .coordinator
        .create_competition(body)
        .await
        .map(|competition| (StatusCode::CREATED, Json(competition)))
        .map_err(|e| {
            error!("error creating competition: {:?}", e);
            e.into()
        })
}

pub async fn update_competition_status(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
    Json(body): Json<UpdateStatus>,
) -> Result<Json<Competition>, ErrorResponse> {
    state
        .coordinator
        .update_competition_status(competition_id, body.status)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error updating status of competition {}: {:?}",
                competition_id, e
            );
            e.into()
        })
}

pub async fn submit_results(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
    Json(body): Json<SubmitResults>,
) -> Result<Json<CompetitionDetail>, ErrorResponse> {
    state
        .coordinator
        .submit_results(competition_id, body)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error submitting results for competition {}: {:?}",
                competition_id, e
            );
            e.into()
        })
}

pub async fn trigger_scoring(
    State(state): State<Arc<AppState>>,
    Path(competition_id): Path<Uuid>,
) -> Result<Json<ScoringSummary>, ErrorResponse> {
    state
        .coordinator
        .trigger_scoring(competition_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error scoring competition {}: {:?}", competition_id, e);
            e.into()
        })
}

pub async fn get_admin_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AdminStats>, ErrorResponse> {
    state.coordinator.admin_stats().await.map(Json).map_err(|e| {
        error!("error getting admin stats: {:?}", e);
        e.into()
    })
}
