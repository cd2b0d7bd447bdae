use earnings_core::UserStats;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    domain::{conflict_on_unique, Error},
    infra::db::{format_datetime, parse_required_datetime, parse_u32, parse_uuid, DBConnection},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub stats: UserStats,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: parse_uuid(row, "id")?,
            username: row.try_get("username")?,
            name: row.try_get("name")?,
            stats: stats_from_row(row)?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

pub(crate) fn stats_from_row(row: &SqliteRow) -> Result<UserStats, sqlx::Error> {
    Ok(UserStats {
        total_predictions: parse_u32(row, "total_predictions")?,
        total_wins: parse_u32(row, "total_wins")?,
        average_score: row.try_get("average_score")?,
    })
}

const USER_COLUMNS: &str = "id, username, name, total_predictions, total_wins, average_score, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct UserStore {
    db_connection: DBConnection,
}

impl UserStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn create_user(&self, username: String, name: Option<String>) -> Result<User, Error> {
        let id = Uuid::now_v7();
        let now = format_datetime(OffsetDateTime::now_utc())?;
        let conflict_message = format!("username {} is already taken", username);

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, User>(&format!(
                    "INSERT INTO users (
                        id,
                        username,
                        name,
                        created_at,
                        updated_at
                    ) VALUES (?, ?, ?, ?, ?)
                    RETURNING {}",
                    USER_COLUMNS
                ))
                .bind(id.to_string())
                .bind(username)
                .bind(name)
                .bind(now.clone())
                .bind(now)
                .fetch_one(&pool)
                .await
            })
            .await
            .map_err(|e| conflict_on_unique(e, conflict_message))
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_optional(self.db_connection.read())
        .await?;

        user.ok_or_else(|| Error::NotFound(format!("user not found with id: {}", user_id)))
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(self.db_connection.read())
            .await?;
        Ok(count > 0)
    }

    /// Users with at least one scored prediction, best first
    pub async fn global_leaderboard(&self, limit: u32) -> Result<Vec<User>, Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {}
            FROM users
            WHERE total_predictions > 0
            ORDER BY total_wins DESC, average_score ASC, username ASC
            LIMIT ?",
            USER_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(self.db_connection.read())
        .await?;

        Ok(users)
    }
}
