pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    CompetitionStore, Coordinator, Error as CoordinatorError, UserInfo, UserStore,
};
pub use infra::db::*;
pub use infra::file_utils::*;
pub use startup::*;
