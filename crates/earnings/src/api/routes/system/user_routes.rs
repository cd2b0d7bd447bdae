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
    domain::{CreateUser, GlobalLeaderboardEntry, User},
    startup::AppState,
};

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), ErrorResponse> {
    state
        .users_info
        .create_user(body)
        .await
        .map(|user| (StatusCode::CREATED, Json(user)))
        .map_err(|e| {
            error!("error creating user: {:?}", e);
            e.into()
        })
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ErrorResponse> {
    state
        .users_info
        .get_user(user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting user {}: {:?}", user_id, e);
            e.into()
        })
}

pub async fn global_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GlobalLeaderboardEntry>>, ErrorResponse> {
    state
        .users_info
        .global_leaderboard()
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting global leaderboard: {:?}", e);
            e.into()
        })
}
