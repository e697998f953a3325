//! Virtual history synthesizer.
//!
//! Collections with no committed history still need something to serve
//! over upload-pack. This module builds a single-commit object graph from
//! the relational skill catalog: one blob per skill, one subtree per
//! skill holding `SKILL.md`, a `skills` directory over all of them, a
//! root tree, and a commit with a fixed identity and timestamp so an
//! unchanged catalog always hashes to the same id.
//!
//! Prediction and materialization run the exact same builder; only the
//! sink differs. That is what guarantees they agree bit-for-bit.

use skillbase_core::frontmatter::skill_template;
use skillbase_core::object::{Commit, FileMode, ObjectType, Signature};
use skillbase_core::{GitError, Oid};

use crate::db::SkillRecord;
use crate::store::{DirNode, GitStore, NullSink, ObjectSink};

/// Author identity on every virtual commit. Changing this changes every
/// virtual commit id, so it is a constant, not configuration.
pub const VIRTUAL_AUTHOR_NAME: &str = "Skillbase";
pub const VIRTUAL_AUTHOR_EMAIL: &str = "noreply@skillbase.dev";

const VIRTUAL_MESSAGE: &str = "Snapshot of skill catalog\n";

fn virtual_signature() -> Signature {
    Signature::new(VIRTUAL_AUTHOR_NAME, VIRTUAL_AUTHOR_EMAIL, 0)
}

/// The rendered `SKILL.md` for one skill: stored content when present,
/// otherwise the default template.
fn skill_document(skill: &SkillRecord) -> Vec<u8> {
    match &skill.content {
        Some(content) => content.clone().into_bytes(),
        None => skill_template(&skill.name, &skill.description).into_bytes(),
    }
}

/// Build the virtual graph into `sink` and return the commit id.
fn synthesize(skills: &[SkillRecord], sink: &mut dyn ObjectSink) -> Result<Oid, GitError> {
    let mut root = DirNode::default();
    for skill in skills {
        let blob = sink.put(ObjectType::Blob, &skill_document(skill))?;
        root.insert(
            &format!("skills/{}/SKILL.md", skill.path),
            blob,
            FileMode::Regular,
        )?;
    }
    let tree = root.write(sink)?;
    let commit = Commit {
        tree,
        parents: Vec::new(),
        author: virtual_signature(),
        committer: virtual_signature(),
        message: VIRTUAL_MESSAGE.to_string(),
    };
    sink.put(ObjectType::Commit, &commit.encode())
}

/// Compute the virtual commit id without persisting anything.
pub fn predict_commit_id(skills: &[SkillRecord]) -> Result<Oid, GitError> {
    synthesize(skills, &mut NullSink)
}

/// Persist the virtual graph into the collection's store and return the
/// commit id. Safe to call repeatedly; object writes are idempotent.
pub fn materialize(store: &GitStore, skills: &[SkillRecord]) -> Result<Oid, GitError> {
    store.with_sink(|sink| synthesize(skills, sink))
}
