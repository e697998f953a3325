//! JSON endpoints exercised by the platform around the git core: health,
//! collection lookup, skill listing, and pull request lifecycle.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::auth::TokenService;
use crate::db::{CatalogRepo, CollectionInfo, TokenScope};
use crate::error::ApiError;
use crate::merge;

#[derive(Clone)]
pub struct ApiState {
    pub repo: CatalogRepo,
    pub tokens: TokenService,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/collections/{account}/{collection}", get(show_collection))
        .route(
            "/api/collections/{account}/{collection}/skills",
            get(list_skills),
        )
        .route(
            "/api/collections/{account}/{collection}/pulls",
            post(create_pull_request),
        )
        .route(
            "/api/collections/{account}/{collection}/pulls/{pr}/merge",
            post(merge_pull_request),
        )
        .route(
            "/api/collections/{account}/{collection}/pulls/{pr}/close",
            post(close_pull_request),
        )
        .with_state(state)
}

fn find_collection(
    state: &ApiState,
    headers: &HeaderMap,
    account: &str,
    collection: &str,
    needed: TokenScope,
) -> Result<CollectionInfo, ApiError> {
    let collection = state
        .repo
        .find_collection(account, collection)?
        .ok_or(ApiError::NotFound)?;
    state.tokens.authorize_collection(headers, &collection, needed)?;
    Ok(collection)
}

async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn show_collection(
    State(state): State<ApiState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let collection = find_collection(&state, &headers, &account, &collection, TokenScope::Read)?;
    Ok(Json(json!({
        "slug": collection.slug,
        "visibility": collection.visibility.as_str(),
        "default_branch": collection.default_branch,
    })))
}

#[derive(Serialize)]
struct SkillSummary {
    path: String,
    name: String,
    description: String,
}

async fn list_skills(
    State(state): State<ApiState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<SkillSummary>>, ApiError> {
    let collection = find_collection(&state, &headers, &account, &collection, TokenScope::Read)?;
    let skills = state
        .repo
        .list_active_skills(&collection.id)?
        .into_iter()
        .map(|s| SkillSummary {
            path: s.path,
            name: s.name,
            description: s.description,
        })
        .collect();
    Ok(Json(skills))
}

#[derive(Deserialize)]
struct CreatePullRequest {
    source_branch: String,
    target_branch: Option<String>,
    title: Option<String>,
}

async fn create_pull_request(
    State(state): State<ApiState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreatePullRequest>,
) -> Result<Json<Value>, ApiError> {
    let collection = find_collection(&state, &headers, &account, &collection, TokenScope::Write)?;
    let target = req
        .target_branch
        .unwrap_or_else(|| collection.default_branch.clone());
    let pr = state.repo.create_pull_request(
        &collection.id,
        &req.source_branch,
        &target,
        req.title.as_deref(),
    )?;
    Ok(Json(json!({
        "id": pr.id,
        "source_branch": pr.source_branch,
        "target_branch": pr.target_branch,
        "status": pr.status.as_str(),
    })))
}

#[derive(Deserialize, Default)]
struct MergeRequest {
    #[serde(default)]
    override_deletions: bool,
}

async fn merge_pull_request(
    State(state): State<ApiState>,
    Path((account, collection, pr)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Option<Json<MergeRequest>>,
) -> Result<Json<Value>, ApiError> {
    let collection = find_collection(&state, &headers, &account, &collection, TokenScope::Write)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = merge::merge_pull_request(&state.repo, &collection, &pr, req.override_deletions)?;
    Ok(Json(json!({
        "merge_commit": outcome.merge_commit.to_hex(),
        "archived": outcome.archived,
    })))
}

async fn close_pull_request(
    State(state): State<ApiState>,
    Path((account, collection, pr)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let collection = find_collection(&state, &headers, &account, &collection, TokenScope::Write)?;
    merge::close_pull_request(&state.repo, &collection, &pr)?;
    Ok(Json(json!({ "status": "closed" })))
}
