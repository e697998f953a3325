//! # `skillbase_core`
//!
//! Shared library for the Skillbase platform: the content-addressed git
//! object model (blobs, trees, commits, canonical SHA-1 ids), the pkt-line
//! and side-band transport framing, pack (v2) encoding, and the restricted
//! SKILL.md front matter dialect.
//!
//! Everything here is pure: no database, no HTTP, no async. The server
//! crate supplies storage behind the [`pack::ObjectSource`] seam.

#![warn(missing_docs)]

/// Crate error type.
pub mod error;

/// The restricted SKILL.md front matter dialect.
pub mod frontmatter;

/// Git object encoding and parsing.
pub mod object;

/// Object ids.
pub mod oid;

/// Pack closure collection and encoding.
pub mod pack;

/// Pkt-line framing and the upload-pack request grammar.
pub mod pkt;

pub use error::GitError;
pub use object::{Commit, FileMode, ObjectType, Signature, TreeEntry};
pub use oid::Oid;
