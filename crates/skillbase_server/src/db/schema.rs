use rusqlite::Connection;

/// SQL schema for the catalog and the git backing tables
const SCHEMA: &str = r#"
-- Accounts (tenants)
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    slug TEXT UNIQUE NOT NULL,
    display_name TEXT,
    created_at INTEGER NOT NULL
);

-- Skill collections, each backed by one git namespace (repo_id = collection id)
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    slug TEXT NOT NULL,
    visibility TEXT NOT NULL DEFAULT 'public',
    default_branch TEXT NOT NULL DEFAULT 'main',
    created_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_collections_account_slug ON collections(account_id, slug);

-- Skill catalog rows; ground truth for virtual history, rewritten on merge
CREATE TABLE IF NOT EXISTS skills (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    metadata TEXT,
    content TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_skills_collection_path ON skills(collection_id, path);

-- API tokens: only a SHA-256 digest is stored; the prefix narrows lookup
CREATE TABLE IF NOT EXISTS api_tokens (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    prefix TEXT NOT NULL,
    token_sha256 TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT 'read',
    revoked INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_used_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_api_tokens_prefix ON api_tokens(prefix);

-- Pull requests; status transitions are one-way (open -> merged | closed)
CREATE TABLE IF NOT EXISTS pull_requests (
    id TEXT PRIMARY KEY,
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    source_branch TEXT NOT NULL,
    target_branch TEXT NOT NULL,
    title TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    created_at INTEGER NOT NULL,
    merged_at INTEGER,
    closed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_pull_requests_collection ON pull_requests(collection_id);

-- Content-addressed git objects, zlib-compressed, namespaced per repo.
-- size is the uncompressed length.
CREATE TABLE IF NOT EXISTS git_objects (
    repo_id TEXT NOT NULL,
    sha TEXT NOT NULL,
    type TEXT NOT NULL,
    content BLOB NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (repo_id, sha)
);

-- Refs: either a direct sha or one level of symbolic indirection
CREATE TABLE IF NOT EXISTS git_refs (
    repo_id TEXT NOT NULL,
    name TEXT NOT NULL,
    sha TEXT,
    symbolic_target TEXT,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (repo_id, name)
);

-- Denormalized (branch, path) -> (blob, mode) cache, rebuilt on ref advance
CREATE TABLE IF NOT EXISTS git_file_index (
    repo_id TEXT NOT NULL,
    branch TEXT NOT NULL,
    path TEXT NOT NULL,
    blob_sha TEXT NOT NULL,
    mode TEXT NOT NULL,
    PRIMARY KEY (repo_id, branch, path)
);
"#;

/// Initialize the database with the catalog and git schema
pub fn init_database(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;

    // Forward migration: add default_branch to collections created before
    // branches were configurable.
    let has_default_branch: bool = conn
        .prepare("PRAGMA table_info(collections)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == "default_branch");
    if !has_default_branch {
        conn.execute(
            "ALTER TABLE collections ADD COLUMN default_branch TEXT NOT NULL DEFAULT 'main'",
            [],
        )?;
    }

    // Forward migration: add last_used_at to api_tokens.
    let has_last_used: bool = conn
        .prepare("PRAGMA table_info(api_tokens)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(Result::ok)
        .any(|name| name == "last_used_at");
    if !has_last_used {
        conn.execute("ALTER TABLE api_tokens ADD COLUMN last_used_at INTEGER", [])?;
    }

    Ok(())
}
