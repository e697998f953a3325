use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::store::GitStore;

/// Collection visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    /// Parse a visibility string; unknown values fall back to Private.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

/// API token scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Read,
    Write,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Read => "read",
            TokenScope::Write => "write",
        }
    }

    /// Parse a scope string; unknown values fall back to Read.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "write" => TokenScope::Write,
            _ => TokenScope::Read,
        }
    }

    /// Whether this scope covers `needed`.
    pub fn allows(&self, needed: TokenScope) -> bool {
        match needed {
            TokenScope::Read => true,
            TokenScope::Write => matches!(self, TokenScope::Write),
        }
    }
}

/// Pull request status; transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestStatus {
    Open,
    Merged,
    Closed,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestStatus::Open => "open",
            PullRequestStatus::Merged => "merged",
            PullRequestStatus::Closed => "closed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "open" => PullRequestStatus::Open,
            "merged" => PullRequestStatus::Merged,
            _ => PullRequestStatus::Closed,
        }
    }
}

/// Account information
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub id: String,
    pub slug: String,
    pub display_name: Option<String>,
    pub created_at: i64,
}

/// Collection information
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub id: String,
    pub account_id: String,
    pub slug: String,
    pub visibility: Visibility,
    pub default_branch: String,
    pub created_at: i64,
}

/// One skill row
#[derive(Debug, Clone)]
pub struct SkillRecord {
    pub id: String,
    pub collection_id: String,
    /// Directory path of the skill under `skills/` in the repo tree.
    pub path: String,
    pub name: String,
    pub description: String,
    /// JSON object with the unrecognized front matter keys.
    pub metadata: Option<String>,
    /// Full SKILL.md document, when one has been stored.
    pub content: Option<String>,
    pub archived: bool,
    pub updated_at: i64,
}

/// Stored API token metadata (the token itself is never stored).
#[derive(Debug, Clone)]
pub struct ApiTokenRecord {
    pub id: String,
    pub account_id: String,
    pub prefix: String,
    pub token_sha256: String,
    pub scope: TokenScope,
    pub revoked: bool,
}

/// Pull request information
#[derive(Debug, Clone)]
pub struct PullRequestInfo {
    pub id: String,
    pub collection_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub title: Option<String>,
    pub status: PullRequestStatus,
}

/// Catalog repository for database operations
#[derive(Clone)]
pub struct CatalogRepo {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepo {
    /// Create a new CatalogRepo with the given connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// The shared connection, for callers that need a transaction spanning
    /// the catalog and the git tables (the merge engine).
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// A git store over the same connection, namespaced to one collection.
    pub fn git_store(&self, repo_id: &str) -> GitStore {
        GitStore::new(self.conn.clone(), repo_id)
    }

    // ===== Accounts =====

    pub fn create_account(&self, slug: &str) -> Result<AccountInfo, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let account = AccountInfo {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            display_name: None,
            created_at: Utc::now().timestamp(),
        };
        conn.execute(
            "INSERT INTO accounts (id, slug, created_at) VALUES (?, ?, ?)",
            params![account.id, account.slug, account.created_at],
        )?;
        Ok(account)
    }

    pub fn find_account_by_slug(&self, slug: &str) -> Result<Option<AccountInfo>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, slug, display_name, created_at FROM accounts WHERE slug = ?",
            [slug],
            |row| {
                Ok(AccountInfo {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    display_name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
    }

    // ===== Collections =====

    /// Create a collection and seed its HEAD symref.
    pub fn create_collection(
        &self,
        account_id: &str,
        slug: &str,
        visibility: Visibility,
    ) -> Result<CollectionInfo, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().timestamp();
        let collection = CollectionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            slug: slug.to_string(),
            visibility,
            default_branch: "main".to_string(),
            created_at: now,
        };
        conn.execute(
            "INSERT INTO collections (id, account_id, slug, visibility, default_branch, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                collection.id,
                collection.account_id,
                collection.slug,
                collection.visibility.as_str(),
                collection.default_branch,
                collection.created_at
            ],
        )?;
        conn.execute(
            "INSERT INTO git_refs (repo_id, name, sha, symbolic_target, updated_at)
             VALUES (?, 'HEAD', NULL, ?, ?)",
            params![
                collection.id,
                format!("refs/heads/{}", collection.default_branch),
                now
            ],
        )?;
        Ok(collection)
    }

    /// Resolve a collection by `(account slug, collection slug)`.
    pub fn find_collection(
        &self,
        account_slug: &str,
        collection_slug: &str,
    ) -> Result<Option<CollectionInfo>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT c.id, c.account_id, c.slug, c.visibility, c.default_branch, c.created_at
             FROM collections c JOIN accounts a ON a.id = c.account_id
             WHERE a.slug = ? AND c.slug = ?",
            params![account_slug, collection_slug],
            |row| {
                Ok(CollectionInfo {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    slug: row.get(2)?,
                    visibility: Visibility::from_str_lossy(&row.get::<_, String>(3)?),
                    default_branch: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
    }

    // ===== Skills =====

    /// Active (non-archived) skills, ordered by path. The virtual
    /// synthesizer depends on this ordering being stable.
    pub fn list_active_skills(
        &self,
        collection_id: &str,
    ) -> Result<Vec<SkillRecord>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, collection_id, path, name, description, metadata, content, archived, updated_at
             FROM skills WHERE collection_id = ? AND archived = 0 ORDER BY path",
        )?;
        let rows = stmt
            .query_map([collection_id], skill_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_skill(
        &self,
        collection_id: &str,
        path: &str,
    ) -> Result<Option<SkillRecord>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, collection_id, path, name, description, metadata, content, archived, updated_at
             FROM skills WHERE collection_id = ? AND path = ?",
            params![collection_id, path],
            skill_from_row,
        )
        .optional()
    }

    /// Insert or update a skill at `(collection, path)`. Duplicate paths
    /// are resolved by update-in-place, never surfaced as an error.
    pub fn upsert_skill(
        &self,
        collection_id: &str,
        path: &str,
        name: &str,
        description: &str,
        metadata: Option<&str>,
        content: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        tx::upsert_skill(&conn, collection_id, path, name, description, metadata, content)
    }

    // ===== API tokens =====

    pub fn insert_api_token(&self, token: &ApiTokenRecord) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_tokens (id, account_id, prefix, token_sha256, scope, revoked, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                token.id,
                token.account_id,
                token.prefix,
                token.token_sha256,
                token.scope.as_str(),
                token.revoked,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// All unrevoked tokens sharing a prefix; the caller compares digests.
    pub fn find_api_tokens_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<ApiTokenRecord>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, prefix, token_sha256, scope, revoked
             FROM api_tokens WHERE prefix = ? AND revoked = 0",
        )?;
        let rows = stmt
            .query_map([prefix], |row| {
                Ok(ApiTokenRecord {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    prefix: row.get(2)?,
                    token_sha256: row.get(3)?,
                    scope: TokenScope::from_str_lossy(&row.get::<_, String>(4)?),
                    revoked: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn touch_api_token(&self, token_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE api_tokens SET last_used_at = ? WHERE id = ?",
            params![Utc::now().timestamp(), token_id],
        )?;
        Ok(())
    }

    pub fn revoke_api_token(&self, token_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE api_tokens SET revoked = 1 WHERE id = ?",
            params![token_id],
        )?;
        Ok(())
    }

    // ===== Pull requests =====

    pub fn create_pull_request(
        &self,
        collection_id: &str,
        source_branch: &str,
        target_branch: &str,
        title: Option<&str>,
    ) -> Result<PullRequestInfo, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let pr = PullRequestInfo {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            title: title.map(str::to_string),
            status: PullRequestStatus::Open,
        };
        conn.execute(
            "INSERT INTO pull_requests (id, collection_id, source_branch, target_branch, title, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'open', ?)",
            params![
                pr.id,
                pr.collection_id,
                pr.source_branch,
                pr.target_branch,
                pr.title,
                Utc::now().timestamp()
            ],
        )?;
        Ok(pr)
    }

    pub fn get_pull_request(
        &self,
        pr_id: &str,
    ) -> Result<Option<PullRequestInfo>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        tx::get_pull_request(&conn, pr_id)
    }
}

fn skill_from_row(row: &rusqlite::Row<'_>) -> Result<SkillRecord, rusqlite::Error> {
    Ok(SkillRecord {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        path: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        metadata: row.get(5)?,
        content: row.get(6)?,
        archived: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Helpers over a borrowed connection, shared between the public methods
/// above and the merge engine's transaction.
pub(crate) mod tx {
    use super::*;

    pub fn upsert_skill(
        conn: &Connection,
        collection_id: &str,
        path: &str,
        name: &str,
        description: &str,
        metadata: Option<&str>,
        content: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO skills (id, collection_id, path, name, description, metadata, content, archived, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(collection_id, path) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 metadata = excluded.metadata,
                 content = excluded.content,
                 archived = 0,
                 updated_at = excluded.updated_at",
            params![
                uuid::Uuid::new_v4().to_string(),
                collection_id,
                path,
                name,
                description,
                metadata,
                content,
                now,
                now
            ],
        )?;
        Ok(())
    }

    /// Soft-delete skill rows whose paths vanished from the merged tree.
    pub fn archive_skills(
        conn: &Connection,
        collection_id: &str,
        paths: &[String],
    ) -> Result<usize, rusqlite::Error> {
        let now = Utc::now().timestamp();
        let mut archived = 0;
        for path in paths {
            archived += conn.execute(
                "UPDATE skills SET archived = 1, updated_at = ? WHERE collection_id = ? AND path = ?",
                params![now, collection_id, path],
            )?;
        }
        Ok(archived)
    }

    pub fn get_pull_request(
        conn: &Connection,
        pr_id: &str,
    ) -> Result<Option<PullRequestInfo>, rusqlite::Error> {
        conn.query_row(
            "SELECT id, collection_id, source_branch, target_branch, title, status
             FROM pull_requests WHERE id = ?",
            [pr_id],
            |row| {
                Ok(PullRequestInfo {
                    id: row.get(0)?,
                    collection_id: row.get(1)?,
                    source_branch: row.get(2)?,
                    target_branch: row.get(3)?,
                    title: row.get(4)?,
                    status: PullRequestStatus::from_str_lossy(&row.get::<_, String>(5)?),
                })
            },
        )
        .optional()
    }

    /// Advance an open pull request to a terminal status. Returns false if
    /// the row was not open (the guard makes transitions one-way).
    pub fn settle_pull_request(
        conn: &Connection,
        pr_id: &str,
        status: PullRequestStatus,
    ) -> Result<bool, rusqlite::Error> {
        let now = Utc::now().timestamp();
        let column = match status {
            PullRequestStatus::Merged => "merged_at",
            _ => "closed_at",
        };
        let changed = conn.execute(
            &format!(
                "UPDATE pull_requests SET status = ?, {column} = ? WHERE id = ? AND status = 'open'"
            ),
            params![status.as_str(), now, pr_id],
        )?;
        Ok(changed == 1)
    }
}
