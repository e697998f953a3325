//! Skillbase server: git core for multi-tenant skill collections.
//!
//! Serves each collection as a git repository over Smart HTTP backed by
//! SQLite, synthesizing virtual history for collections that have never
//! been committed to, and merging pull requests with content-replacement
//! semantics.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod merge;
pub mod store;
pub mod synthesizer;
