use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{User, UserStore};
use crate::domain::Error;

/// Number of users shown on the global leaderboard
pub const GLOBAL_LEADERBOARD_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalLeaderboardEntry {
    pub position: u32,
    #[serde(flatten)]
    pub user: User,
}

pub struct UserInfo {
    user_store: Arc<UserStore>,
}

impl UserInfo {
    pub fn new(user_store: UserStore) -> Self {
        Self {
            user_store: Arc::new(user_store),
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.user_store.ping().await.map_err(Error::DbError)
    }

    pub async fn create_user(&self, payload: CreateUser) -> Result<User, Error> {
        validate_username(&payload.username)?;
        if self.user_store.username_exists(&payload.username).await? {
            return Err(Error::Conflict(format!(
                "username {} is already taken",
                payload.username
            )));
        }

        let name = payload
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let user = self.user_store.create_user(payload.username, name).await?;
        info!("registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, Error> {
        self.user_store.get_user(user_id).await
    }

    pub async fn global_leaderboard(&self) -> Result<Vec<GlobalLeaderboardEntry>, Error> {
        let users = self
            .user_store
            .global_leaderboard(GLOBAL_LEADERBOARD_SIZE)
            .await?;

        Ok(users
            .into_iter()
            .zip(1..)
            .map(|(user, position)| GlobalLeaderboardEntry { position, user })
            .collect())
    }
}

pub fn validate_username(username: &str) -> Result<(), Error> {
    let length = username.chars().count();
    if !(3..=32).contains(&length) {
        return Err(Error::BadRequest(String::from(
            "username must be between 3 and 32 characters",
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::BadRequest(String::from(
            "username may only contain letters, numbers and underscores",
        )));
    }
    Ok(())
}
