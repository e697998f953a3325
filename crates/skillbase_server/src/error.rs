//! Server error taxonomy and its HTTP mapping.
//!
//! `NotFound` is returned uniformly for missing accounts, collections, and
//! objects so probing cannot distinguish "private" from "absent". Git
//! clients act on status codes and `WWW-Authenticate` only, so protocol
//! failures map to plain statuses; the JSON bodies exist for the platform's
//! own callers.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use skillbase_core::GitError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing account, collection, ref, or object.
    #[error("not found")]
    NotFound,

    /// Credentials required but absent.
    #[error("authentication required")]
    Unauthorized,

    /// Credentials present but invalid, revoked, or out of scope.
    #[error("forbidden")]
    Forbidden,

    /// Merge would delete skills and the caller did not confirm.
    #[error("merge would delete {} skill(s)", .0.len())]
    DestructiveChange(Vec<String>),

    /// The merge could not proceed, usually a lost compare-and-set race.
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// The pull request is already merged or closed.
    #[error("pull request is not open")]
    PullRequestNotOpen,

    /// Object model, codec, or protocol failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Database failure.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound | ApiError::Git(GitError::ObjectNotFound(_)) => {
                StatusCode::NOT_FOUND.into_response()
            }
            ApiError::Unauthorized => {
                let mut response = StatusCode::UNAUTHORIZED.into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"skillbase\""),
                );
                response
            }
            ApiError::Forbidden => StatusCode::FORBIDDEN.into_response(),
            ApiError::DestructiveChange(paths) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "destructive_change",
                    "message": "merge would delete skills; re-submit with override_deletions",
                    "deleted_paths": paths,
                })),
            )
                .into_response(),
            ApiError::MergeConflict(message) => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "merge_conflict",
                    "message": message,
                })),
            )
                .into_response(),
            ApiError::PullRequestNotOpen => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "pull_request_not_open",
                })),
            )
                .into_response(),
            ApiError::Git(GitError::Protocol(reason)) => {
                (StatusCode::BAD_REQUEST, reason).into_response()
            }
            ApiError::Git(GitError::InvalidObjectId(id)) => {
                (StatusCode::BAD_REQUEST, format!("invalid object id {id}")).into_response()
            }
            ApiError::Git(err) => {
                error!("git error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            ApiError::Db(err) => {
                error!("database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
