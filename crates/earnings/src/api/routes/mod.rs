mod coordinator;
mod system;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::Error;

pub use coordinator::*;
pub use system::*;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
            Error::BadRequest(_) | Error::Validation(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            Error::ResultsIncomplete { missing } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "missing_metrics": missing }),
            ),
            Error::Conflict(_) | Error::AlreadyScored(_) => {
                (StatusCode::CONFLICT, json!({ "error": self.to_string() }))
            }
            Error::DbError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal server error" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
