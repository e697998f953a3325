pub mod repo;
pub mod schema;

pub use repo::{
    AccountInfo, ApiTokenRecord, CatalogRepo, CollectionInfo, PullRequestInfo, PullRequestStatus,
    SkillRecord, TokenScope, Visibility,
};
pub use schema::init_database;
