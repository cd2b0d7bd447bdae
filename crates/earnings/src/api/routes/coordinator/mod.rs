mod admin_routes;
mod competition_routes;

pub use admin_routes::*;
pub use competition_routes::*;
