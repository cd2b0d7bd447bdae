mod competitions;
mod users;

pub use competitions::*;
use earnings_core::CoreError;
use thiserror::Error;
pub use users::*;
use uuid::Uuid;

use crate::infra::db::DatabaseWriteError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("results incomplete, missing metrics: {missing:?}")]
    ResultsIncomplete { missing: Vec<Uuid> },
    #[error("competition {0} has already been scored")]
    AlreadyScored(Uuid),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(#[from] CoreError),
}

impl From<DatabaseWriteError> for Error {
    fn from(value: DatabaseWriteError) -> Self {
        match value {
            DatabaseWriteError::Sqlx(e) => Error::DbError(e),
            DatabaseWriteError::LockTimeout(_) => Error::DbError(sqlx::Error::PoolTimedOut),
        }
    }
}

/// Map unique constraint failures to a conflict, everything else stays a db error
pub(crate) fn conflict_on_unique(err: DatabaseWriteError, message: impl Into<String>) -> Error {
    match err {
        DatabaseWriteError::Sqlx(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Error::Conflict(message.into())
        }
        e => e.into(),
    }
}
