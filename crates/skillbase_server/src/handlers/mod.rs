pub mod api;
pub mod git;

pub use api::ApiState;
pub use git::GitState;
