//! earnings-core: scoring engine and shared types for earnings prediction competitions
//!
//! Nothing in this crate performs I/O. The service crate loads records from
//! storage, hands them to [`score_competition`] and persists what comes back.

pub mod errors;
pub mod scoring;
pub mod stats;
pub mod types;
pub mod validation;

pub use errors::*;
pub use scoring::*;
pub use stats::*;
pub use types::*;
pub use validation::*;
