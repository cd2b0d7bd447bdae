mod health_check;
mod user_routes;

pub use health_check::*;
pub use user_routes::*;
