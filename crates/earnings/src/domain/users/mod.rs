mod info;
mod store;

pub use info::*;
pub use store::*;
