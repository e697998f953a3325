//! JSON API tests: health, collection lookup, and the pull request
//! lifecycle over HTTP, including the destructive-change confirm round.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use rusqlite::Connection;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use skillbase_core::object::Signature;
use skillbase_server::auth::TokenService;
use skillbase_server::db::{CatalogRepo, CollectionInfo, TokenScope, Visibility, init_database};
use skillbase_server::handlers::ApiState;
use skillbase_server::store::CommitSpec;

struct TestContext {
    app: Router,
    repo: CatalogRepo,
    collection: CollectionInfo,
    write_token: String,
}

fn setup() -> TestContext {
    let conn = Connection::open_in_memory().unwrap();
    init_database(&conn).unwrap();
    let repo = CatalogRepo::new(conn);
    let account = repo.create_account("alice").unwrap();
    let collection = repo
        .create_collection(&account.id, "tools", Visibility::Public)
        .unwrap();
    let tokens = TokenService::new(repo.clone());
    let write_token = tokens.issue(&account.id, TokenScope::Write).unwrap().token;

    let state = ApiState {
        repo: repo.clone(),
        tokens,
    };
    TestContext {
        app: skillbase_server::handlers::api::router(state),
        repo,
        collection,
        write_token,
    }
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn seed_branches(ctx: &TestContext) {
    let author = Signature::new("Test", "test@example.com", 1000);
    let store = ctx.repo.git_store(&ctx.collection.id);
    store
        .commit(CommitSpec {
            branch: "main",
            files: vec![
                (
                    "skills/greet/SKILL.md".to_string(),
                    b"---\nname: Greet\ndescription: hi\n---\n".to_vec(),
                ),
                (
                    "skills/sum/SKILL.md".to_string(),
                    b"---\nname: Sum\ndescription: adds\n---\n".to_vec(),
                ),
            ],
            message: "seed main",
            author: author.clone(),
        })
        .unwrap();
    store
        .commit(CommitSpec {
            branch: "feature",
            files: vec![(
                "skills/greet/SKILL.md".to_string(),
                b"---\nname: Greet\ndescription: hi v2\n---\n".to_vec(),
            )],
            message: "trim to greet",
            author,
        })
        .unwrap();
}

#[tokio::test]
async fn test_status_endpoint() {
    let ctx = setup();
    let (status, body) = send_json(&ctx.app, "GET", "/api/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_collection_lookup() {
    let ctx = setup();
    let (status, body) =
        send_json(&ctx.app, "GET", "/api/collections/alice/tools", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slug"], "tools");
    assert_eq!(body["visibility"], "public");
    assert_eq!(body["default_branch"], "main");

    let (status, _) =
        send_json(&ctx.app, "GET", "/api/collections/alice/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_skill_listing() {
    let ctx = setup();
    ctx.repo
        .upsert_skill(&ctx.collection.id, "greet", "Greet", "hi", None, None)
        .unwrap();
    let (status, body) = send_json(
        &ctx.app,
        "GET",
        "/api/collections/alice/tools/skills",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["path"], "greet");
    assert_eq!(body[0]["name"], "Greet");
}

#[tokio::test]
async fn test_pull_request_merge_over_http() {
    let ctx = setup();
    seed_branches(&ctx);
    let token = Some(ctx.write_token.as_str());

    let (status, pr) = send_json(
        &ctx.app,
        "POST",
        "/api/collections/alice/tools/pulls",
        token,
        Some(json!({ "source_branch": "feature" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pr["target_branch"], "main");
    assert_eq!(pr["status"], "open");
    let pr_id = pr["id"].as_str().unwrap().to_string();

    // The merge would drop "sum"; without the override it is a 409 with
    // the structured path list.
    let merge_uri = format!("/api/collections/alice/tools/pulls/{pr_id}/merge");
    let (status, body) = send_json(&ctx.app, "POST", &merge_uri, token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "destructive_change");
    assert_eq!(body["deleted_paths"], json!(["sum"]));

    // Confirmed.
    let (status, body) = send_json(
        &ctx.app,
        "POST",
        &merge_uri,
        token,
        Some(json!({ "override_deletions": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archived"], json!(["sum"]));
    assert!(body["merge_commit"].as_str().unwrap().len() == 40);

    // A second merge hits the terminal status.
    let (status, body) = send_json(&ctx.app, "POST", &merge_uri, token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "pull_request_not_open");
}

#[tokio::test]
async fn test_pull_request_close_over_http() {
    let ctx = setup();
    seed_branches(&ctx);
    let token = Some(ctx.write_token.as_str());

    let (_, pr) = send_json(
        &ctx.app,
        "POST",
        "/api/collections/alice/tools/pulls",
        token,
        Some(json!({ "source_branch": "feature" })),
    )
    .await;
    let pr_id = pr["id"].as_str().unwrap().to_string();

    let close_uri = format!("/api/collections/alice/tools/pulls/{pr_id}/close");
    let (status, body) = send_json(&ctx.app, "POST", &close_uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");

    // Closing is terminal; the merge path refuses too.
    let merge_uri = format!("/api/collections/alice/tools/pulls/{pr_id}/merge");
    let (status, _) = send_json(&ctx.app, "POST", &merge_uri, token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_writes_require_write_scope() {
    let ctx = setup();
    seed_branches(&ctx);

    // Public collection, anonymous write attempt: challenge.
    let (status, _) = send_json(
        &ctx.app,
        "POST",
        "/api/collections/alice/tools/pulls",
        None,
        Some(json!({ "source_branch": "feature" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
