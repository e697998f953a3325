use std::fmt;
use std::str::FromStr;

use sha1::{Digest as _, Sha1};

use crate::error::GitError;

/// A 20-byte SHA-1 object id, the content address of every stored object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; 20]);

impl Oid {
    /// The null id, used for deleted / missing entries.
    pub const NULL: Self = Oid([0; 20]);

    /// Hash the input bytes and return the resulting id.
    pub fn hash(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        Oid(hasher.finalize().into())
    }

    /// Build an id from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GitError> {
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| GitError::InvalidObjectId(hex::encode(bytes)))?;
        Ok(Oid(raw))
    }

    /// The raw 20 bytes, as written into tree entries and pack trailers.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Format the id as a 40 character hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shorten the id for display. Does not check for collisions.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl FromStr for Oid {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(GitError::InvalidObjectId(s.to_string()));
        }
        let raw = hex::decode(s).map_err(|_| GitError::InvalidObjectId(s.to_string()))?;
        Self::from_bytes(&raw)
    }
}
