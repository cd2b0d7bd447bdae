//! Shared error types

use thiserror::Error;

/// Core errors shared between the scoring library and the service
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    #[error("unknown metric code: {0}")]
    UnknownMetricCode(String),

    #[error("unknown competition status: {0}")]
    UnknownStatus(String),
}
