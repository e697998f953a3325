//! Git Smart HTTP endpoints: ref advertisement and upload-pack.
//!
//! Both are stateless per exchange; everything a response needs is
//! re-derived from the current database state. Clones must work with an
//! unmodified git client, so the wire bytes here follow the protocol
//! exactly, down to the content types.

use std::collections::{HashMap, HashSet};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use skillbase_core::pack::{collect_objects, encode_pack};
use skillbase_core::pkt::{
    BAND_PACK, UploadPackRequest, write_flush, write_pkt_line, write_side_band,
};
use skillbase_core::{GitError, Oid};

use crate::auth::TokenService;
use crate::db::{CatalogRepo, CollectionInfo, TokenScope};
use crate::error::ApiError;
use crate::store::GitStore;
use crate::synthesizer;

const ADVERTISEMENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
const RESULT_TYPE: &str = "application/x-git-upload-pack-result";
const AGENT: &str = concat!("skillbase/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct GitState {
    pub repo: CatalogRepo,
    pub tokens: TokenService,
    pub pack_object_cap: usize,
}

pub fn router(state: GitState) -> Router {
    Router::new()
        .route("/{account}/{collection}/info/refs", get(info_refs))
        .route("/{account}/{collection}/git-upload-pack", post(upload_pack))
        .with_state(state)
}

/// The commit a fresh clone lands on: the default branch tip when one
/// exists, otherwise the predicted virtual commit. The virtual case
/// returns an id for an object that may not be stored yet.
fn resolve_head(state: &GitState, collection: &CollectionInfo) -> Result<Oid, ApiError> {
    let store = state.repo.git_store(&collection.id);
    let branch_ref = format!("refs/heads/{}", collection.default_branch);
    if let Some(tip) = store.get_ref(&branch_ref)? {
        return Ok(tip);
    }
    let skills = state.repo.list_active_skills(&collection.id)?;
    Ok(synthesizer::predict_commit_id(&skills)?)
}

fn find_collection(
    state: &GitState,
    account: &str,
    collection: &str,
) -> Result<CollectionInfo, ApiError> {
    state
        .repo
        .find_collection(account, collection)?
        .ok_or(ApiError::NotFound)
}

async fn info_refs(
    State(state): State<GitState>,
    Path((account, collection)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if params.get("service").map(String::as_str) != Some("git-upload-pack") {
        return Err(ApiError::NotFound);
    }
    let collection = find_collection(&state, &account, &collection)?;
    state
        .tokens
        .authorize_collection(&headers, &collection, TokenScope::Read)?;

    let head = resolve_head(&state, &collection)?;
    let store = state.repo.git_store(&collection.id);

    let mut body = Vec::new();
    write_pkt_line(&mut body, b"# service=git-upload-pack\n");
    write_flush(&mut body);

    let caps = format!(
        "side-band-64k shallow symref=HEAD:refs/heads/{} agent={AGENT}",
        collection.default_branch
    );
    write_pkt_line(&mut body, format!("{head} HEAD\0{caps}\n").as_bytes());
    let branches = store.list_branches()?;
    // A virtual-only repo has no stored tips; advertise the default
    // branch at the synthesized head so clones land on a named branch.
    if !branches.iter().any(|(b, _)| *b == collection.default_branch) {
        write_pkt_line(
            &mut body,
            format!("{head} refs/heads/{}\n", collection.default_branch).as_bytes(),
        );
    }
    for (branch, tip) in branches {
        write_pkt_line(&mut body, format!("{tip} refs/heads/{branch}\n").as_bytes());
    }
    write_flush(&mut body);

    Ok((
        [
            (header::CONTENT_TYPE, ADVERTISEMENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

async fn upload_pack(
    State(state): State<GitState>,
    Path((account, collection)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let collection = find_collection(&state, &account, &collection)?;
    // Credentials are checked before any byte of the body is parsed.
    state
        .tokens
        .authorize_collection(&headers, &collection, TokenScope::Read)?;

    let request = UploadPackRequest::parse(&body)?;
    let store = state.repo.git_store(&collection.id);

    // Shallow probe: acknowledge each want and wait for the re-issued
    // request carrying done. No pack yet.
    if request.deepen.is_some_and(|d| d > 0) && !request.done {
        let mut out = Vec::new();
        for want in &request.wants {
            write_pkt_line(&mut out, format!("shallow {want}\n").as_bytes());
        }
        write_flush(&mut out);
        return Ok(([(header::CONTENT_TYPE, RESULT_TYPE)], out).into_response());
    }

    let wants = if request.wants.is_empty() && request.done {
        // Stateless follow-up; re-derive the target instead of trusting
        // any earlier exchange.
        vec![resolve_head(&state, &collection)?]
    } else {
        request.wants.clone()
    };
    if wants.is_empty() {
        return Err(ApiError::Git(GitError::Protocol(
            "no want lines".to_string(),
        )));
    }

    ensure_materialized(&state, &collection, &store, &wants)?;

    let haves: HashSet<Oid> = request.haves.iter().copied().collect();
    let objects = collect_objects(&store, &wants, &haves, state.pack_object_cap)?;
    let pack = encode_pack(&store, &objects)?;

    let mut out = Vec::new();
    write_pkt_line(&mut out, b"NAK\n");
    write_side_band(&mut out, BAND_PACK, &pack);
    write_flush(&mut out);

    Ok(([(header::CONTENT_TYPE, RESULT_TYPE)], out).into_response())
}

/// Lazily persist the virtual graph when a client asks for its predicted
/// commit id before anything has been stored.
fn ensure_materialized(
    state: &GitState,
    collection: &CollectionInfo,
    store: &GitStore,
    wants: &[Oid],
) -> Result<(), ApiError> {
    for want in wants {
        if store.contains(want)? {
            continue;
        }
        let skills = state.repo.list_active_skills(&collection.id)?;
        let predicted = synthesizer::predict_commit_id(&skills)?;
        if *want == predicted {
            let materialized = synthesizer::materialize(store, &skills)?;
            tracing::debug!(commit = %materialized, repo = %collection.id, "materialized virtual history");
        }
    }
    Ok(())
}
