//! Pull request merge engine.
//!
//! Merges are content-replacement: the merge commit's tree is the source
//! tree as-is, parented on the target tip. There is no three-way
//! resolution; the source always wins. Ref advance, file index rebuild,
//! catalog resync, and the status flip all happen inside one transaction,
//! with a compare-and-set on the target ref so concurrent merges cannot
//! silently drop each other's work.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, TransactionBehavior};

use skillbase_core::frontmatter::{self, FrontMatter, Value};
use skillbase_core::object::{Commit, ObjectType, Signature};
use skillbase_core::{GitError, Oid};

use crate::db::repo::tx as catalog;
use crate::db::{CatalogRepo, CollectionInfo, PullRequestStatus};
use crate::error::ApiError;
use crate::store::ops;

/// What a successful merge produced.
#[derive(Debug)]
pub struct MergeOutcome {
    pub merge_commit: Oid,
    /// Skill paths archived because their files vanished from the tree.
    pub archived: Vec<String>,
}

/// Merge an open pull request.
///
/// When the target has skills the source lacks and `override_deletions`
/// is false, nothing moves and the caller gets the would-be-deleted paths
/// back. Re-issuing with the override set confirms the deletions.
pub fn merge_pull_request(
    repo: &CatalogRepo,
    collection: &CollectionInfo,
    pr_id: &str,
    override_deletions: bool,
) -> Result<MergeOutcome, ApiError> {
    let conn = repo.connection();
    let mut guard = conn.lock().unwrap();
    // Take the write lock up front. Another process merging against the
    // same database loses here with a busy error, which is this merge's
    // conflict, not an internal failure.
    let tx = guard
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(conflict_on_busy)?;

    let pr = catalog::get_pull_request(&tx, pr_id)?.ok_or(ApiError::NotFound)?;
    if pr.status != PullRequestStatus::Open || pr.collection_id != collection.id {
        return Err(if pr.collection_id != collection.id {
            ApiError::NotFound
        } else {
            ApiError::PullRequestNotOpen
        });
    }

    let repo_id = collection.id.as_str();
    let source_ref = format!("refs/heads/{}", pr.source_branch);
    let target_ref = format!("refs/heads/{}", pr.target_branch);

    let source_tip = ops::get_ref(&tx, repo_id, &source_ref)?
        .ok_or_else(|| ApiError::MergeConflict(format!("branch {} has no commits", pr.source_branch)))?;
    let target_tip = ops::get_ref(&tx, repo_id, &target_ref)?;

    let source_tree = read_commit_tree(&tx, repo_id, &source_tip)?;
    let source_paths = tree_skill_paths(&tx, repo_id, &source_tree)?;
    let target_paths = match target_tip {
        Some(tip) => {
            let tree = read_commit_tree(&tx, repo_id, &tip)?;
            tree_skill_paths(&tx, repo_id, &tree)?
        }
        // No committed target yet; the active catalog is ground truth.
        None => active_skill_paths(&tx, repo_id)?,
    };

    let deleted: Vec<String> = target_paths.difference(&source_paths).cloned().collect();
    if !deleted.is_empty() && !override_deletions {
        return Err(ApiError::DestructiveChange(deleted));
    }

    let author = Signature::new("Skillbase", "noreply@skillbase.dev", Utc::now().timestamp());
    let merge = Commit {
        tree: source_tree,
        parents: target_tip.into_iter().collect(),
        author: author.clone(),
        committer: author,
        message: format!("Merge {} into {}\n", pr.source_branch, pr.target_branch),
    };
    let merge_oid = ops::write_object(&tx, repo_id, ObjectType::Commit, &merge.encode())?;

    if !ops::set_ref_cas(&tx, repo_id, &target_ref, target_tip_ref(&merge), &merge_oid)? {
        return Err(ApiError::MergeConflict(format!(
            "branch {} moved during merge",
            pr.target_branch
        )));
    }

    ops::update_file_index(&tx, repo_id, &pr.target_branch, &merge.tree)?;
    resync_catalog(&tx, repo_id, &merge.tree)?;

    let archived = if deleted.is_empty() {
        Vec::new()
    } else {
        catalog::archive_skills(&tx, repo_id, &deleted)?;
        deleted
    };

    if !catalog::settle_pull_request(&tx, pr_id, PullRequestStatus::Merged)? {
        return Err(ApiError::PullRequestNotOpen);
    }

    tx.commit().map_err(conflict_on_busy)?;
    Ok(MergeOutcome {
        merge_commit: merge_oid,
        archived,
    })
}

/// A busy database means another writer holds the target; surface it as
/// the merge losing the race rather than an internal error.
fn conflict_on_busy(err: rusqlite::Error) -> ApiError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy
                || failure.code == ErrorCode::DatabaseLocked =>
        {
            ApiError::MergeConflict("another merge holds the target branch".to_string())
        }
        _ => ApiError::Db(err),
    }
}

fn target_tip_ref(merge: &Commit) -> Option<&Oid> {
    merge.parents.first()
}

/// Close an open pull request without touching any tree.
pub fn close_pull_request(
    repo: &CatalogRepo,
    collection: &CollectionInfo,
    pr_id: &str,
) -> Result<(), ApiError> {
    let conn = repo.connection();
    let guard = conn.lock().unwrap();
    let pr = catalog::get_pull_request(&guard, pr_id)?.ok_or(ApiError::NotFound)?;
    if pr.collection_id != collection.id {
        return Err(ApiError::NotFound);
    }
    if !catalog::settle_pull_request(&guard, pr_id, PullRequestStatus::Closed)? {
        return Err(ApiError::PullRequestNotOpen);
    }
    Ok(())
}

fn read_commit_tree(conn: &Connection, repo_id: &str, oid: &Oid) -> Result<Oid, GitError> {
    let (kind, content) = ops::read_object(conn, repo_id, oid)?;
    if kind != ObjectType::Commit {
        return Err(GitError::CorruptObject {
            oid: oid.to_hex(),
            reason: format!("expected commit, found {}", kind.as_str()),
        });
    }
    Ok(Commit::parse(&content)?.tree)
}

/// The skill directory encoded in a `skills/<path>/SKILL.md` leaf.
fn skill_path(leaf: &str) -> Option<&str> {
    let path = leaf.strip_prefix("skills/")?.strip_suffix("/SKILL.md")?;
    (!path.is_empty()).then_some(path)
}

fn tree_skill_paths(
    conn: &Connection,
    repo_id: &str,
    tree: &Oid,
) -> Result<BTreeSet<String>, GitError> {
    let mut paths = BTreeSet::new();
    for (leaf, _, _) in ops::list_files_from_tree(conn, repo_id, tree)? {
        if let Some(path) = skill_path(&leaf) {
            paths.insert(path.to_string());
        }
    }
    Ok(paths)
}

fn active_skill_paths(conn: &Connection, collection_id: &str) -> Result<BTreeSet<String>, GitError> {
    let mut stmt = conn
        .prepare("SELECT path FROM skills WHERE collection_id = ? AND archived = 0")
        .map_err(|e| GitError::Storage(e.to_string()))?;
    let rows = stmt
        .query_map([collection_id], |row| row.get::<_, String>(0))
        .map_err(|e| GitError::Storage(e.to_string()))?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|e| GitError::Storage(e.to_string()))?;
    Ok(rows)
}

/// Upsert a skill row for every `skills/<path>/SKILL.md` blob in `tree`.
fn resync_catalog(conn: &Connection, collection_id: &str, tree: &Oid) -> Result<(), ApiError> {
    for (leaf, blob, _) in ops::list_files_from_tree(conn, collection_id, tree)? {
        let Some(path) = skill_path(&leaf) else {
            continue;
        };
        let (_, content) = ops::read_object(conn, collection_id, &blob)?;
        let document = String::from_utf8_lossy(&content).into_owned();
        let (name, description, metadata) = match frontmatter::parse(&document) {
            Ok((fm, _)) => {
                let name = fm
                    .name
                    .clone()
                    .unwrap_or_else(|| fallback_name(path));
                let description = fm.description.clone().unwrap_or_default();
                (name, description, metadata_json(&fm))
            }
            Err(err) => {
                tracing::warn!(path, %err, "unparseable front matter, using fallbacks");
                (fallback_name(path), String::new(), None)
            }
        };
        catalog::upsert_skill(
            conn,
            collection_id,
            path,
            &name,
            &description,
            metadata.as_deref(),
            Some(&document),
        )?;
    }
    Ok(())
}

fn fallback_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Unrecognized front matter keys, as a JSON object. None when empty.
fn metadata_json(fm: &FrontMatter) -> Option<String> {
    if fm.extra.is_empty() {
        return None;
    }
    let mut map = serde_json::Map::new();
    for (key, value) in &fm.extra {
        let json = match value {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|i| serde_json::Value::String(i.clone()))
                    .collect(),
            ),
        };
        map.insert(key.clone(), json);
    }
    Some(serde_json::Value::Object(map).to_string())
}
