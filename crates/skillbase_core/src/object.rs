//! Encoding and parsing of the three stored object kinds.
//!
//! Byte formats match Git exactly: an object's id is the SHA-1 of
//! `"<type> <len>\0"` followed by its content, tree entries are
//! `<mode> <name>\0<20 raw id bytes>` in canonical order, and commits are
//! the usual header-line block followed by a blank line and the message.

use crate::error::GitError;
use crate::oid::Oid;

/// The three stored object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// A directory listing.
    Tree,
    /// A snapshot with ancestry.
    Commit,
}

impl ObjectType {
    /// The lowercase name used in canonical headers and storage rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
        }
    }

    /// Parse a stored type name.
    pub fn parse(s: &str) -> Result<Self, GitError> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            other => Err(GitError::malformed(
                "header",
                format!("unknown object type {other:?}"),
            )),
        }
    }

    /// Pack entry type code (pack format version 2).
    pub fn pack_code(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
        }
    }

    /// Inverse of [`ObjectType::pack_code`].
    pub fn from_pack_code(code: u8) -> Result<Self, GitError> {
        match code {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            other => Err(GitError::malformed(
                "pack entry",
                format!("unsupported pack type code {other}"),
            )),
        }
    }
}

/// Prepend the canonical `"<type> <len>\0"` header to `content`.
pub fn with_header(kind: ObjectType, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 16);
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(content.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(content);
    out
}

/// Canonical object id: `sha1("<type> <len>\0" + content)`.
pub fn object_id(kind: ObjectType, content: &[u8]) -> Oid {
    Oid::hash(&with_header(kind, content))
}

/// Tree entry modes Skillbase stores. `40000` marks a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// A regular file, `100644`.
    Regular,
    /// An executable file, `100755`.
    Executable,
    /// A subtree, `40000`.
    Directory,
}

impl FileMode {
    /// The octal string written into tree payloads (no leading zero).
    pub fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Directory => "40000",
        }
    }

    /// Parse a tree entry mode.
    pub fn parse(s: &str) -> Result<Self, GitError> {
        match s {
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            // Some writers pad the directory mode to six digits.
            "40000" | "040000" => Ok(FileMode::Directory),
            other => Err(GitError::malformed(
                "tree",
                format!("unsupported entry mode {other:?}"),
            )),
        }
    }

    /// Whether the entry points at a subtree.
    pub fn is_tree(&self) -> bool {
        matches!(self, FileMode::Directory)
    }
}

/// One `<mode> <name>\0<id>` entry of a tree payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: FileMode,
    /// Entry name, a single path segment.
    pub name: String,
    /// Id of the blob or subtree.
    pub oid: Oid,
}

// Git's canonical entry order compares names byte-wise with directory
// names extended by a trailing '/'.
fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.clone().into_bytes();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

/// Encode entries into a tree payload, sorting them canonically.
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| sort_key(entry));

    let mut data = Vec::new();
    for entry in sorted {
        data.extend_from_slice(entry.mode.as_octal().as_bytes());
        data.push(b' ');
        data.extend_from_slice(entry.name.as_bytes());
        data.push(0);
        data.extend_from_slice(entry.oid.as_bytes());
    }
    data
}

/// Parse a tree payload back into its entries, in stored order.
pub fn parse_tree(content: &[u8]) -> Result<Vec<TreeEntry>, GitError> {
    let mut entries = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitError::malformed("tree", "missing mode terminator"))?;
        let mode = std::str::from_utf8(&rest[..space])
            .map_err(|_| GitError::malformed("tree", "non-utf8 mode"))
            .and_then(FileMode::parse)?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::malformed("tree", "missing name terminator"))?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| GitError::malformed("tree", "non-utf8 entry name"))?
            .to_string();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(GitError::malformed("tree", "truncated entry id"));
        }
        let oid = Oid::from_bytes(&rest[..20])?;
        rest = &rest[20..];

        entries.push(TreeEntry { mode, name, oid });
    }
    Ok(entries)
}

/// An author or committer line: name, email, seconds since the epoch, and
/// a timezone offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address, written inside angle brackets.
    pub email: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Offset such as `+0000`.
    pub tz_offset: String,
}

impl Signature {
    /// A signature in UTC.
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset: "+0000".to_string(),
        }
    }

    fn encode(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.tz_offset
        )
    }

    fn parse(s: &str) -> Result<Self, GitError> {
        let open = s
            .find('<')
            .ok_or_else(|| GitError::malformed("commit", "signature missing email"))?;
        let close = s
            .find('>')
            .ok_or_else(|| GitError::malformed("commit", "signature missing email terminator"))?;
        if close < open {
            return Err(GitError::malformed("commit", "mangled signature email"));
        }
        let name = s[..open].trim_end().to_string();
        let email = s[open + 1..close].to_string();
        let mut tail = s[close + 1..].split_whitespace();
        let timestamp = tail
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| GitError::malformed("commit", "signature missing timestamp"))?;
        let tz_offset = tail.next().unwrap_or("+0000").to_string();
        Ok(Self {
            name,
            email,
            timestamp,
            tz_offset,
        })
    }
}

/// A parsed or to-be-written commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree of the snapshot.
    pub tree: Oid,
    /// Parent commits, zero or more.
    pub parents: Vec<Oid>,
    /// Author signature.
    pub author: Signature,
    /// Committer signature.
    pub committer: Signature,
    /// Commit message, conventionally newline-terminated.
    pub message: String,
}

impl Commit {
    /// Encode into the canonical commit payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {}\n", self.author.encode()));
        out.push_str(&format!("committer {}\n", self.committer.encode()));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// The commit's canonical object id.
    pub fn id(&self) -> Oid {
        object_id(ObjectType::Commit, &self.encode())
    }

    /// Parse a commit payload.
    pub fn parse(content: &[u8]) -> Result<Self, GitError> {
        let text = std::str::from_utf8(content)
            .map_err(|_| GitError::malformed("commit", "non-utf8 payload"))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        let mut lines = text.lines();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(rest.parse()?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(rest.parse()?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Signature::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Signature::parse(rest)?);
            }
            // Unknown headers (gpgsig, encoding) are tolerated and dropped.
        }

        let mut message = lines.collect::<Vec<_>>().join("\n");
        if !message.is_empty() {
            message.push('\n');
        }

        Ok(Self {
            tree: tree.ok_or_else(|| GitError::malformed("commit", "missing tree header"))?,
            parents,
            author: author
                .ok_or_else(|| GitError::malformed("commit", "missing author header"))?,
            committer: committer
                .ok_or_else(|| GitError::malformed("commit", "missing committer header"))?,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_blob_fixture() {
        // `echo hello | git hash-object --stdin`
        let oid = object_id(ObjectType::Blob, b"hello\n");
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn tree_round_trip_and_order() {
        let blob = object_id(ObjectType::Blob, b"x");
        let entries = vec![
            TreeEntry {
                mode: FileMode::Directory,
                name: "zeta".into(),
                oid: blob,
            },
            TreeEntry {
                mode: FileMode::Regular,
                name: "alpha".into(),
                oid: blob,
            },
        ];
        let payload = encode_tree(&entries);
        let parsed = parse_tree(&payload).unwrap();
        assert_eq!(parsed[0].name, "alpha");
        assert_eq!(parsed[1].name, "zeta");
        assert!(parsed[1].mode.is_tree());
    }

    #[test]
    fn directory_sorts_with_virtual_slash() {
        // "lib" (dir) must sort after "lib-extras" (file) because the
        // directory compares as "lib/".
        let blob = object_id(ObjectType::Blob, b"x");
        let entries = vec![
            TreeEntry {
                mode: FileMode::Directory,
                name: "lib".into(),
                oid: blob,
            },
            TreeEntry {
                mode: FileMode::Regular,
                name: "lib-extras".into(),
                oid: blob,
            },
        ];
        let parsed = parse_tree(&encode_tree(&entries)).unwrap();
        assert_eq!(parsed[0].name, "lib-extras");
        assert_eq!(parsed[1].name, "lib");
    }

    #[test]
    fn commit_round_trip() {
        let commit = Commit {
            tree: object_id(ObjectType::Blob, b"t"),
            parents: vec![object_id(ObjectType::Blob, b"p")],
            author: Signature::new("Ada", "ada@example.com", 1_700_000_000),
            committer: Signature::new("Ada", "ada@example.com", 1_700_000_000),
            message: "Add a skill\n\nWith a body.\n".into(),
        };
        let parsed = Commit::parse(&commit.encode()).unwrap();
        assert_eq!(parsed, commit);
    }

    #[test]
    fn commit_without_parents_parses() {
        let commit = Commit {
            tree: object_id(ObjectType::Blob, b"t"),
            parents: vec![],
            author: Signature::new("Skillbase", "noreply@skillbase.dev", 0),
            committer: Signature::new("Skillbase", "noreply@skillbase.dev", 0),
            message: "Snapshot\n".into(),
        };
        let parsed = Commit::parse(&commit.encode()).unwrap();
        assert!(parsed.parents.is_empty());
        assert_eq!(parsed.id(), commit.id());
    }
}
