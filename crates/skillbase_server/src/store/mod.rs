//! Database-backed git object store.
//!
//! Objects, refs, and a flat file index live in SQLite, namespaced by the
//! owning collection id. Object payloads are zlib-compressed at rest and
//! re-hashed on every read, so a corrupted row is detected before it can
//! leak into a pack.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use flate2::Compression;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use rusqlite::{Connection, OptionalExtension, params};

use skillbase_core::object::{Commit, FileMode, ObjectType, Signature, TreeEntry, encode_tree};
use skillbase_core::pack::ObjectSource;
use skillbase_core::{GitError, Oid};

/// Receives loose objects as a tree builder emits them. The synthesizer
/// runs the same builder against a no-op sink to predict ids without
/// persisting anything.
pub trait ObjectSink {
    fn put(&mut self, kind: ObjectType, content: &[u8]) -> Result<Oid, GitError>;
}

/// Sink that computes ids and discards the objects.
pub struct NullSink;

impl ObjectSink for NullSink {
    fn put(&mut self, kind: ObjectType, content: &[u8]) -> Result<Oid, GitError> {
        Ok(skillbase_core::object::object_id(kind, content))
    }
}

/// Sink that persists objects into one collection's namespace.
pub struct StoreSink<'a> {
    conn: &'a Connection,
    repo_id: &'a str,
}

impl<'a> StoreSink<'a> {
    pub fn new(conn: &'a Connection, repo_id: &'a str) -> Self {
        Self { conn, repo_id }
    }
}

impl ObjectSink for StoreSink<'_> {
    fn put(&mut self, kind: ObjectType, content: &[u8]) -> Result<Oid, GitError> {
        ops::write_object(self.conn, self.repo_id, kind, content)
    }
}

/// A flat commit request: full desired file listing for one branch.
pub struct CommitSpec<'a> {
    pub branch: &'a str,
    /// `(path, content)` pairs; paths use `/` separators.
    pub files: Vec<(String, Vec<u8>)>,
    pub message: &'a str,
    pub author: Signature,
}

/// Handle to one collection's git namespace.
#[derive(Clone)]
pub struct GitStore {
    conn: Arc<Mutex<Connection>>,
    repo_id: String,
}

impl GitStore {
    pub fn new(conn: Arc<Mutex<Connection>>, repo_id: &str) -> Self {
        Self {
            conn,
            repo_id: repo_id.to_string(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Run `f` with a persisting sink over this collection's namespace,
    /// holding the connection lock for the duration.
    pub fn with_sink<T>(
        &self,
        f: impl FnOnce(&mut dyn ObjectSink) -> Result<T, GitError>,
    ) -> Result<T, GitError> {
        let conn = self.conn.lock().unwrap();
        let mut sink = StoreSink::new(&conn, &self.repo_id);
        f(&mut sink)
    }

    pub fn contains(&self, oid: &Oid) -> Result<bool, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::contains(&conn, &self.repo_id, oid)
    }

    pub fn read_object(&self, oid: &Oid) -> Result<(ObjectType, Vec<u8>), GitError> {
        let conn = self.conn.lock().unwrap();
        ops::read_object(&conn, &self.repo_id, oid)
    }

    pub fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError> {
        let (kind, content) = self.read_object(oid)?;
        if kind != ObjectType::Blob {
            return Err(GitError::CorruptObject {
                oid: oid.to_hex(),
                reason: format!("expected blob, found {}", kind.as_str()),
            });
        }
        Ok(content)
    }

    pub fn read_commit(&self, oid: &Oid) -> Result<Commit, GitError> {
        let (kind, content) = self.read_object(oid)?;
        if kind != ObjectType::Commit {
            return Err(GitError::CorruptObject {
                oid: oid.to_hex(),
                reason: format!("expected commit, found {}", kind.as_str()),
            });
        }
        Commit::parse(&content)
    }

    pub fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::write_object(&conn, &self.repo_id, ObjectType::Blob, content)
    }

    pub fn write_commit(&self, commit: &Commit) -> Result<Oid, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::write_object(&conn, &self.repo_id, ObjectType::Commit, &commit.encode())
    }

    /// Resolve a ref to an object id, following one level of symref.
    pub fn get_ref(&self, name: &str) -> Result<Option<Oid>, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::get_ref(&conn, &self.repo_id, name)
    }

    pub fn set_ref(&self, name: &str, oid: &Oid) -> Result<(), GitError> {
        let conn = self.conn.lock().unwrap();
        ops::set_ref(&conn, &self.repo_id, name, oid)
    }

    /// Compare-and-set a ref. Returns false when the stored value did not
    /// match `expected`, in which case nothing moves.
    pub fn set_ref_cas(
        &self,
        name: &str,
        expected: Option<&Oid>,
        new: &Oid,
    ) -> Result<bool, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::set_ref_cas(&conn, &self.repo_id, name, expected, new)
    }

    pub fn list_branches(&self) -> Result<Vec<(String, Oid)>, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::list_branches(&conn, &self.repo_id)
    }

    /// Files on a branch, from the flat index.
    pub fn list_files(&self, branch: &str) -> Result<Vec<(String, Oid, FileMode)>, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::list_files(&conn, &self.repo_id, branch)
    }

    /// Leaf files reachable from a tree, walked recursively.
    pub fn list_files_from_tree(
        &self,
        tree: &Oid,
    ) -> Result<Vec<(String, Oid, FileMode)>, GitError> {
        let conn = self.conn.lock().unwrap();
        ops::list_files_from_tree(&conn, &self.repo_id, tree)
    }

    /// Rebuild the flat index for a branch from a tree, full replace.
    pub fn update_file_index(&self, branch: &str, tree: &Oid) -> Result<(), GitError> {
        let conn = self.conn.lock().unwrap();
        ops::update_file_index(&conn, &self.repo_id, branch, tree)
    }

    /// Write a commit from a flat file listing: builds blobs and nested
    /// trees, parents it on the current branch tip, advances the ref, and
    /// rebuilds the flat index for the branch.
    pub fn commit(&self, spec: CommitSpec<'_>) -> Result<Oid, GitError> {
        let conn = self.conn.lock().unwrap();
        let parent = ops::get_ref(&conn, &self.repo_id, &format!("refs/heads/{}", spec.branch))?;

        let mut sink = StoreSink::new(&conn, &self.repo_id);
        let mut root = DirNode::default();
        for (path, content) in &spec.files {
            let oid = sink.put(ObjectType::Blob, content)?;
            root.insert(path, oid, FileMode::Regular)?;
        }
        let tree = root.write(&mut sink)?;

        let commit = Commit {
            tree,
            parents: parent.into_iter().collect(),
            author: spec.author.clone(),
            committer: spec.author,
            message: spec.message.to_string(),
        };
        let commit_oid = sink.put(ObjectType::Commit, &commit.encode())?;

        ops::set_ref(&conn, &self.repo_id, &format!("refs/heads/{}", spec.branch), &commit_oid)?;
        ops::update_file_index(&conn, &self.repo_id, spec.branch, &tree)?;
        Ok(commit_oid)
    }
}

impl ObjectSource for GitStore {
    fn object(&self, oid: &Oid) -> Result<(ObjectType, Vec<u8>), GitError> {
        self.read_object(oid)
    }
}

/// In-memory nested directory used to build tree objects bottom-up.
#[derive(Default)]
pub struct DirNode {
    files: BTreeMap<String, (Oid, FileMode)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    pub fn insert(&mut self, path: &str, oid: Oid, mode: FileMode) -> Result<(), GitError> {
        match path.split_once('/') {
            Some((dir, rest)) => {
                if dir.is_empty() || rest.is_empty() {
                    return Err(GitError::Protocol(format!("invalid path {path:?}")));
                }
                self.dirs.entry(dir.to_string()).or_default().insert(rest, oid, mode)
            }
            None => {
                if path.is_empty() {
                    return Err(GitError::Protocol("empty path".to_string()));
                }
                self.files.insert(path.to_string(), (oid, mode));
                Ok(())
            }
        }
    }

    /// Emit nested tree objects into `sink` and return the root tree id.
    pub fn write(&self, sink: &mut dyn ObjectSink) -> Result<Oid, GitError> {
        let mut entries = Vec::new();
        for (name, child) in &self.dirs {
            let oid = child.write(sink)?;
            entries.push(TreeEntry {
                mode: FileMode::Directory,
                name: name.clone(),
                oid,
            });
        }
        for (name, (oid, mode)) in &self.files {
            entries.push(TreeEntry {
                mode: *mode,
                name: name.clone(),
                oid: *oid,
            });
        }
        sink.put(ObjectType::Tree, &encode_tree(&entries))
    }
}

/// Operations over a borrowed connection, shared between [`GitStore`] and
/// the merge engine's transaction.
pub(crate) mod ops {
    use super::*;
    use skillbase_core::object::parse_tree;

    fn db_err(e: rusqlite::Error) -> GitError {
        GitError::Storage(e.to_string())
    }

    pub fn contains(conn: &Connection, repo_id: &str, oid: &Oid) -> Result<bool, GitError> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM git_objects WHERE repo_id = ? AND sha = ?",
                params![repo_id, oid.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    pub fn write_object(
        conn: &Connection,
        repo_id: &str,
        kind: ObjectType,
        content: &[u8],
    ) -> Result<Oid, GitError> {
        let oid = skillbase_core::object::object_id(kind, content);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content)?;
        let compressed = encoder.finish()?;
        conn.execute(
            "INSERT OR IGNORE INTO git_objects (repo_id, sha, type, content, size, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                repo_id,
                oid.to_hex(),
                kind.as_str(),
                compressed,
                content.len() as i64,
                Utc::now().timestamp()
            ],
        )
        .map_err(db_err)?;
        Ok(oid)
    }

    pub fn read_object(
        conn: &Connection,
        repo_id: &str,
        oid: &Oid,
    ) -> Result<(ObjectType, Vec<u8>), GitError> {
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT type, content FROM git_objects WHERE repo_id = ? AND sha = ?",
                params![repo_id, oid.to_hex()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let (kind_str, stored) = row.ok_or_else(|| GitError::ObjectNotFound(oid.to_hex()))?;
        let kind = ObjectType::parse(&kind_str).map_err(|_| GitError::CorruptObject {
            oid: oid.to_hex(),
            reason: format!("unknown object type {kind_str:?}"),
        })?;

        // Rows written before compression was introduced hold raw bytes.
        let content = match decompress(&stored) {
            Ok(bytes) => bytes,
            Err(_) => stored,
        };

        let actual = skillbase_core::object::object_id(kind, &content);
        if actual != *oid {
            return Err(GitError::CorruptObject {
                oid: oid.to_hex(),
                reason: format!("content hashes to {actual}"),
            });
        }
        Ok((kind, content))
    }

    fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(Vec::new());
        decoder.write_all(bytes)?;
        decoder.finish()
    }

    pub fn get_ref(conn: &Connection, repo_id: &str, name: &str) -> Result<Option<Oid>, GitError> {
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT sha, symbolic_target FROM git_refs WHERE repo_id = ? AND name = ?",
                params![repo_id, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        match row {
            None => Ok(None),
            Some((_, Some(target))) => {
                let row: Option<Option<String>> = conn
                    .query_row(
                        "SELECT sha FROM git_refs WHERE repo_id = ? AND name = ?",
                        params![repo_id, target],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(db_err)?;
                parse_opt_sha(row.flatten())
            }
            Some((sha, None)) => parse_opt_sha(sha),
        }
    }

    fn parse_opt_sha(sha: Option<String>) -> Result<Option<Oid>, GitError> {
        match sha {
            None => Ok(None),
            Some(hex) => Ok(Some(hex.parse()?)),
        }
    }

    pub fn set_ref(
        conn: &Connection,
        repo_id: &str,
        name: &str,
        oid: &Oid,
    ) -> Result<(), GitError> {
        conn.execute(
            "INSERT INTO git_refs (repo_id, name, sha, symbolic_target, updated_at)
             VALUES (?, ?, ?, NULL, ?)
             ON CONFLICT(repo_id, name) DO UPDATE SET
                 sha = excluded.sha, symbolic_target = NULL, updated_at = excluded.updated_at",
            params![repo_id, name, oid.to_hex(), Utc::now().timestamp()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn set_ref_cas(
        conn: &Connection,
        repo_id: &str,
        name: &str,
        expected: Option<&Oid>,
        new: &Oid,
    ) -> Result<bool, GitError> {
        let now = Utc::now().timestamp();
        let changed = match expected {
            Some(old) => conn
                .execute(
                    "UPDATE git_refs SET sha = ?, updated_at = ?
                     WHERE repo_id = ? AND name = ? AND sha = ?",
                    params![new.to_hex(), now, repo_id, name, old.to_hex()],
                )
                .map_err(db_err)?,
            None => conn
                .execute(
                    "INSERT INTO git_refs (repo_id, name, sha, symbolic_target, updated_at)
                     SELECT ?1, ?2, ?3, NULL, ?4
                     WHERE NOT EXISTS (
                         SELECT 1 FROM git_refs
                         WHERE repo_id = ?1 AND name = ?2 AND sha IS NOT NULL
                     )
                     ON CONFLICT(repo_id, name) DO UPDATE SET
                         sha = excluded.sha, symbolic_target = NULL,
                         updated_at = excluded.updated_at
                         WHERE git_refs.sha IS NULL",
                    params![repo_id, name, new.to_hex(), now],
                )
                .map_err(db_err)?,
        };
        Ok(changed == 1)
    }

    pub fn list_branches(
        conn: &Connection,
        repo_id: &str,
    ) -> Result<Vec<(String, Oid)>, GitError> {
        let mut stmt = conn
            .prepare(
                "SELECT name, sha FROM git_refs
                 WHERE repo_id = ? AND name LIKE 'refs/heads/%' AND sha IS NOT NULL
                 ORDER BY name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([repo_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut branches = Vec::with_capacity(rows.len());
        for (name, sha) in rows {
            let short = name
                .strip_prefix("refs/heads/")
                .unwrap_or(&name)
                .to_string();
            branches.push((short, sha.parse()?));
        }
        Ok(branches)
    }

    pub fn list_files(
        conn: &Connection,
        repo_id: &str,
        branch: &str,
    ) -> Result<Vec<(String, Oid, FileMode)>, GitError> {
        let mut stmt = conn
            .prepare(
                "SELECT path, blob_sha, mode FROM git_file_index
                 WHERE repo_id = ? AND branch = ? ORDER BY path",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![repo_id, branch], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut files = Vec::with_capacity(rows.len());
        for (path, sha, mode) in rows {
            let mode = FileMode::parse(&mode)
                .map_err(|_| GitError::Storage(format!("bad mode {mode:?} in file index")))?;
            files.push((path, sha.parse()?, mode));
        }
        Ok(files)
    }

    /// Walk a tree recursively, yielding `(path, blob, mode)` leaves.
    pub fn list_files_from_tree(
        conn: &Connection,
        repo_id: &str,
        tree: &Oid,
    ) -> Result<Vec<(String, Oid, FileMode)>, GitError> {
        let mut files = Vec::new();
        walk_tree(conn, repo_id, tree, "", &mut files)?;
        Ok(files)
    }

    fn walk_tree(
        conn: &Connection,
        repo_id: &str,
        tree: &Oid,
        prefix: &str,
        out: &mut Vec<(String, Oid, FileMode)>,
    ) -> Result<(), GitError> {
        let (kind, content) = read_object(conn, repo_id, tree)?;
        if kind != ObjectType::Tree {
            return Err(GitError::CorruptObject {
                oid: tree.to_hex(),
                reason: format!("expected tree, found {}", kind.as_str()),
            });
        }
        for entry in parse_tree(&content)? {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_tree() {
                walk_tree(conn, repo_id, &entry.oid, &path, out)?;
            } else {
                out.push((path, entry.oid, entry.mode));
            }
        }
        Ok(())
    }

    /// Full-replace rebuild of the flat index for one branch from a tree.
    pub fn update_file_index(
        conn: &Connection,
        repo_id: &str,
        branch: &str,
        tree: &Oid,
    ) -> Result<(), GitError> {
        conn.execute(
            "DELETE FROM git_file_index WHERE repo_id = ? AND branch = ?",
            params![repo_id, branch],
        )
        .map_err(db_err)?;
        for (path, blob, mode) in list_files_from_tree(conn, repo_id, tree)? {
            conn.execute(
                "INSERT INTO git_file_index (repo_id, branch, path, blob_sha, mode)
                 VALUES (?, ?, ?, ?, ?)",
                params![repo_id, branch, path, blob.to_hex(), mode.as_octal()],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;

    fn test_store() -> GitStore {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        GitStore::new(Arc::new(Mutex::new(conn)), "repo-1")
    }

    fn sig() -> Signature {
        Signature::new("Test", "test@example.com", 0)
    }

    #[test]
    fn test_blob_round_trip() {
        let store = test_store();
        let oid = store.write_blob(b"hello\n").unwrap();
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(store.contains(&oid).unwrap());
        assert_eq!(store.read_blob(&oid).unwrap(), b"hello\n");
    }

    #[test]
    fn test_double_write_is_idempotent() {
        let store = test_store();
        let a = store.write_blob(b"hello\n").unwrap();
        let b = store.write_blob(b"hello\n").unwrap();
        assert_eq!(a, b);
        let conn = store.conn.lock().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM git_objects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_missing_object() {
        let store = test_store();
        let err = store.read_blob(&Oid::NULL).unwrap_err();
        assert!(matches!(err, GitError::ObjectNotFound(_)));
    }

    #[test]
    fn test_corrupt_row_detected() {
        let store = test_store();
        let oid = store.write_blob(b"hello\n").unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE git_objects SET content = X'00ff00ff' WHERE sha = ?",
                [oid.to_hex()],
            )
            .unwrap();
        }
        let err = store.read_blob(&oid).unwrap_err();
        assert!(matches!(err, GitError::CorruptObject { .. }));
    }

    #[test]
    fn test_uncompressed_row_readable() {
        // Legacy rows store raw content without a zlib wrapper.
        let store = test_store();
        let oid = skillbase_core::object::object_id(ObjectType::Blob, b"legacy");
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO git_objects (repo_id, sha, type, content, size, created_at)
                 VALUES ('repo-1', ?, 'blob', X'6c6567616379', 6, 0)",
                [oid.to_hex()],
            )
            .unwrap();
        }
        assert_eq!(store.read_blob(&oid).unwrap(), b"legacy");
    }

    #[test]
    fn test_flat_commit_builds_nested_trees() {
        let store = test_store();
        let commit_oid = store
            .commit(CommitSpec {
                branch: "main",
                files: vec![
                    ("skills/greet/SKILL.md".to_string(), b"hi".to_vec()),
                    ("README.md".to_string(), b"readme".to_vec()),
                ],
                message: "initial",
                author: sig(),
            })
            .unwrap();

        let tip = store.get_ref("refs/heads/main").unwrap().unwrap();
        assert_eq!(tip, commit_oid);

        let commit = store.read_commit(&commit_oid).unwrap();
        assert!(commit.parents.is_empty());

        let files = store.list_files("main").unwrap();
        let paths: Vec<_> = files.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "skills/greet/SKILL.md"]);
    }

    #[test]
    fn test_second_commit_parents_on_tip() {
        let store = test_store();
        let first = store
            .commit(CommitSpec {
                branch: "main",
                files: vec![("a.txt".to_string(), b"1".to_vec())],
                message: "one",
                author: sig(),
            })
            .unwrap();
        let second = store
            .commit(CommitSpec {
                branch: "main",
                files: vec![("a.txt".to_string(), b"2".to_vec())],
                message: "two",
                author: sig(),
            })
            .unwrap();
        let commit = store.read_commit(&second).unwrap();
        assert_eq!(commit.parents, vec![first]);
    }

    #[test]
    fn test_head_resolves_through_symref() {
        let store = test_store();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO git_refs (repo_id, name, sha, symbolic_target, updated_at)
                 VALUES ('repo-1', 'HEAD', NULL, 'refs/heads/main', 0)",
                [],
            )
            .unwrap();
        }
        assert!(store.get_ref("HEAD").unwrap().is_none());
        let tip = store
            .commit(CommitSpec {
                branch: "main",
                files: vec![("a.txt".to_string(), b"1".to_vec())],
                message: "one",
                author: sig(),
            })
            .unwrap();
        assert_eq!(store.get_ref("HEAD").unwrap(), Some(tip));
    }

    #[test]
    fn test_cas_rejects_stale_expectation() {
        let store = test_store();
        let first = store
            .commit(CommitSpec {
                branch: "main",
                files: vec![("a.txt".to_string(), b"1".to_vec())],
                message: "one",
                author: sig(),
            })
            .unwrap();
        let other = skillbase_core::object::object_id(ObjectType::Blob, b"x");

        assert!(!store
            .set_ref_cas("refs/heads/main", Some(&other), &other)
            .unwrap());
        assert_eq!(store.get_ref("refs/heads/main").unwrap(), Some(first));

        assert!(store
            .set_ref_cas("refs/heads/main", Some(&first), &other)
            .unwrap());
        assert_eq!(store.get_ref("refs/heads/main").unwrap(), Some(other));
    }

    #[test]
    fn test_cas_none_expectation() {
        let store = test_store();
        let oid = skillbase_core::object::object_id(ObjectType::Blob, b"x");
        assert!(store.set_ref_cas("refs/heads/new", None, &oid).unwrap());
        // A second creation attempt must fail now that the ref exists.
        assert!(!store.set_ref_cas("refs/heads/new", None, &oid).unwrap());
    }

    #[test]
    fn test_cas_over_symbolic_row_clears_the_target() {
        let store = test_store();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO git_refs (repo_id, name, sha, symbolic_target, updated_at)
                 VALUES ('repo-1', 'refs/heads/alias', NULL, 'refs/heads/other', 0)",
                [],
            )
            .unwrap();
        }
        let oid = skillbase_core::object::object_id(ObjectType::Blob, b"x");
        assert!(store
            .set_ref_cas("refs/heads/alias", None, &oid)
            .unwrap());
        // The row must now be a direct ref, not resolve through the old
        // symref target.
        assert_eq!(store.get_ref("refs/heads/alias").unwrap(), Some(oid));
    }

    #[test]
    fn test_repos_are_isolated() {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        let shared = Arc::new(Mutex::new(conn));
        let a = GitStore::new(shared.clone(), "repo-a");
        let b = GitStore::new(shared, "repo-b");

        let oid = a.write_blob(b"only in a").unwrap();
        assert!(a.contains(&oid).unwrap());
        assert!(!b.contains(&oid).unwrap());
    }

    #[test]
    fn test_list_branches() {
        let store = test_store();
        store
            .commit(CommitSpec {
                branch: "main",
                files: vec![("a".to_string(), b"1".to_vec())],
                message: "m",
                author: sig(),
            })
            .unwrap();
        store
            .commit(CommitSpec {
                branch: "dev",
                files: vec![("a".to_string(), b"2".to_vec())],
                message: "d",
                author: sig(),
            })
            .unwrap();
        let branches = store.list_branches().unwrap();
        let names: Vec<_> = branches.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["dev", "main"]);
    }
}
